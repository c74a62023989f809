//! Fixed-capacity blocking FIFO between one producer and many consumers.
//!
//! A `crossbeam` bounded channel. The producer's `send` blocks while the
//! queue is full; every consumer holds a cloned [`Receiver`] whose `recv`
//! blocks while it is empty. Each item reaches exactly one consumer. Once the
//! producer drops its [`Sender`] and the queue drains, `recv` returns an
//! error and consumers stop.

pub use crossbeam::channel::{Receiver, Sender};

/// Creates a queue holding at most `capacity` items.
///
/// A capacity of zero is raised to one, so the queue always buffers.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    crossbeam::channel::bounded(capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order_with_wraparound() {
        let (tx, rx) = bounded(3);
        for round in 0..4 {
            tx.send(round * 10).unwrap();
            tx.send(round * 10 + 1).unwrap();
            assert_eq!(rx.recv().unwrap(), round * 10);
            assert_eq!(rx.recv().unwrap(), round * 10 + 1);
        }
        assert!(rx.is_empty());
        assert_eq!(tx.capacity(), Some(3));
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        let (tx, rx) = bounded(0);
        assert_eq!(tx.capacity(), Some(1));
        tx.send("a").unwrap();
        assert!(tx.try_send("b").is_err());
        assert_eq!(rx.recv().unwrap(), "a");
    }

    #[test]
    fn test_send_blocks_while_full() {
        let (tx, rx) = bounded(2);
        tx.send(1).unwrap();
        tx.send(2).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer = thread::spawn(move || {
            tx.send(3).unwrap();
            done_tx.send(()).unwrap();
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(rx.len(), 2);

        assert_eq!(rx.recv().unwrap(), 1);
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();
        assert_eq!(rx.recv().unwrap(), 2);
        assert_eq!(rx.recv().unwrap(), 3);
    }

    #[test]
    fn test_recv_blocks_while_empty() {
        let (tx, rx) = bounded::<u32>(4);
        let (done_tx, done_rx) = mpsc::channel();
        let consumer = thread::spawn(move || done_tx.send(rx.recv().unwrap()).unwrap());

        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        tx.send(42).unwrap();
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        consumer.join().unwrap();
    }

    #[test]
    fn test_each_item_consumed_exactly_once() {
        let (tx, rx) = bounded(8);
        let (seen_tx, seen_rx) = mpsc::channel();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let rx = rx.clone();
                let seen_tx = seen_tx.clone();
                thread::spawn(move || {
                    while let Ok(item) = rx.recv() {
                        seen_tx.send(item).unwrap();
                    }
                })
            })
            .collect();
        drop(seen_tx);
        drop(rx);

        for i in 0..1000 {
            tx.send(i).unwrap();
        }
        // Consumers stop once the producer is gone and the queue is drained.
        drop(tx);
        for c in consumers {
            c.join().unwrap();
        }

        let seen: Vec<i32> = seen_rx.iter().collect();
        assert_eq!(seen.len(), 1000);
        let unique: HashSet<i32> = seen.into_iter().collect();
        assert_eq!(unique.len(), 1000);
    }
}
