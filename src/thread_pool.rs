use crate::bounded_queue::{self, Receiver, Sender};
use crate::defs::MAX_LINE_LEN;
use crate::errors::ServerError;
use crate::protocol::handle_line;
use crate::record_lock::RecordLock;
use crate::shutdown::Gate;
use crate::store::Store;

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Thread-based stock server.
///
/// One acceptor thread pushes accepted connections into a bounded queue;
/// a fixed pool of workers each takes one connection at a time and serves it
/// until the peer closes. A worker stays pinned to its connection for the
/// connection's whole lifetime, so at most `workers` clients are served at
/// once; the rest wait in the queue, and the acceptor blocks once the queue
/// is full.
///
/// Commands on different records run fully in parallel. Commands on the
/// same record serialize through that record's lock. Every command passes
/// through a shared [`Gate`]; once it is closed, workers drop their
/// connections and the acceptor stops.
pub struct ThreadPoolServer<L> {
    /// TCP listener socket
    listener: TcpListener,

    /// Shared ledger, frozen in shape after load
    store: Arc<Store<L>>,

    /// Closed before the store is flushed
    gate: Arc<Gate>,

    workers: usize,
    queue_capacity: usize,
}

impl<L> ThreadPoolServer<L>
where
    L: RecordLock + Send + Sync + 'static,
{
    /// Binds the listener and sizes the pool.
    ///
    /// # Arguments
    /// * `addr` - Address to bind, e.g. `0.0.0.0:3333`.
    /// * `store` - Ledger shared by every worker.
    /// * `workers` - Number of worker threads.
    /// * `queue_capacity` - Pending connections held before accept blocks.
    pub fn bind(
        addr: SocketAddr,
        store: Arc<Store<L>>,
        workers: usize,
        queue_capacity: usize,
    ) -> Result<Self, ServerError> {
        log::info!("Binding thread-based server to address: {}", addr);
        let listener =
            TcpListener::bind(addr).map_err(|e| ServerError::BindError(e.to_string()))?;

        Ok(Self {
            listener,
            store,
            gate: Arc::new(Gate::new()),
            workers,
            queue_capacity,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))
    }

    /// Gate every request passes through. Close it before flushing the store.
    pub fn gate(&self) -> Arc<Gate> {
        self.gate.clone()
    }

    /// Spawns the workers and the acceptor and returns immediately.
    ///
    /// The threads run until the gate closes; the returned handles are only
    /// useful for diagnostics.
    pub fn start(self) -> Result<Vec<JoinHandle<()>>, ServerError> {
        let (sender, receiver) = bounded_queue::bounded(self.queue_capacity);
        log::info!(
            "Starting {} workers with queue capacity {}",
            self.workers,
            sender.capacity().unwrap_or(self.queue_capacity)
        );
        let mut handles = Vec::with_capacity(self.workers + 1);

        for n in 0..self.workers {
            let receiver = receiver.clone();
            let store = self.store.clone();
            let gate = self.gate.clone();
            let handle = thread::Builder::new()
                .name(format!("worker-{}", n))
                .spawn(move || worker_loop(n, &receiver, &store, &gate))
                .map_err(|e| ServerError::SpawnError(e.to_string()))?;
            handles.push(handle);
        }

        let Self { listener, gate, .. } = self;
        let acceptor = thread::Builder::new()
            .name("acceptor".into())
            .spawn(move || accept_loop(&listener, sender, &gate))
            .map_err(|e| ServerError::SpawnError(e.to_string()))?;
        handles.push(acceptor);

        Ok(handles)
    }
}

/// Accepts until the gate closes. Dropping `queue` on return lets idle
/// workers finish.
fn accept_loop(listener: &TcpListener, queue: Sender<TcpStream>, gate: &Gate) {
    log::info!("Acceptor thread started");
    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                if gate.is_closed() {
                    log::info!("Refusing ({}, {}) during shutdown", addr.ip(), addr.port());
                    return;
                }
                log::info!("Connected to ({}, {})", addr.ip(), addr.port());
                if queue.send(stream).is_err() {
                    log::warn!("No workers left to take connections");
                    return;
                }
            }
            Err(e) => log::error!("Failed to accept TCP connection: {}", e),
        }
    }
}

fn worker_loop<L: RecordLock>(n: usize, queue: &Receiver<TcpStream>, store: &Store<L>, gate: &Gate) {
    log::debug!("Worker {} waiting for connections", n);
    while let Ok(stream) = queue.recv() {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".into());
        log::debug!("Worker {} serving {}", n, peer);

        match serve_connection(stream, store, gate) {
            Ok(()) => log::info!("Client {} closed connection", peer),
            Err(e) => log::warn!("Connection handler error for {}: {}", peer, e),
        }
    }
    log::debug!("Worker {} stopped", n);
}

/// Reads and answers lines until the peer closes or the gate shuts. Dropping
/// the stream on return closes the connection.
///
/// A line longer than [`MAX_LINE_LEN`] is answered in pieces of that size.
fn serve_connection<L: RecordLock>(
    mut stream: TcpStream,
    store: &Store<L>,
    gate: &Gate,
) -> Result<(), ServerError> {
    let cloned = stream
        .try_clone()
        .map_err(|e| ServerError::ClientIoError(e.to_string()))?;
    let mut reader = BufReader::new(cloned);
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader
            .by_ref()
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut line)
            .map_err(|e| ServerError::ClientIoError(e.to_string()))?;
        if n == 0 {
            return Ok(());
        }
        log::debug!("server received {} bytes", n);

        let Some(reply) = gate.admit(|| handle_line(store, &line)) else {
            log::debug!("Dropping connection during shutdown");
            return Ok(());
        };
        stream
            .write_all(&reply.encode())
            .map_err(|e| ServerError::ClientIoError(e.to_string()))?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_lock::ReaderPreferring;
    use std::sync::Barrier;
    use std::time::Duration;

    fn start_pool(records: Vec<(i64, i64, i64)>, workers: usize) -> (SocketAddr, Arc<Store>, Arc<Gate>) {
        let store: Arc<Store<ReaderPreferring>> =
            Arc::new(Store::from_records(records).unwrap());
        let server =
            ThreadPoolServer::bind("127.0.0.1:0".parse().unwrap(), store.clone(), workers, 16)
                .unwrap();
        let addr = server.local_addr().unwrap();
        let gate = server.gate();
        server.start().unwrap();
        (addr, store, gate)
    }

    fn connect(addr: SocketAddr) -> (TcpStream, BufReader<TcpStream>) {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        (stream, reader)
    }

    /// Reads one reply body, up to the empty line that ends it.
    fn read_reply(reader: &mut BufReader<TcpStream>) -> String {
        let mut body = String::new();
        loop {
            let mut line = String::new();
            assert!(reader.read_line(&mut line).unwrap() > 0, "connection closed mid-reply");
            if line == "\n" {
                return body;
            }
            body.push_str(&line);
        }
    }

    fn request(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, cmd: &str) -> String {
        stream.write_all(cmd.as_bytes()).unwrap();
        read_reply(reader)
    }

    #[test]
    fn test_scenario_a() {
        let (addr, store, _gate) = start_pool(vec![(1, 100, 10), (2, 50, 20)], 2);
        let (mut stream, mut reader) = connect(addr);

        assert_eq!(request(&mut stream, &mut reader, "buy 1 30\n"), "[buy] success\n");
        assert_eq!(
            request(&mut stream, &mut reader, "buy 1 1000\n"),
            "Not enough left stock\n"
        );
        assert_eq!(request(&mut stream, &mut reader, "sell 2 5\n"), "[sell] success\n");
        assert_eq!(request(&mut stream, &mut reader, "exit\n"), "exit\n");

        // The server keeps the connection open after `exit`.
        assert_eq!(
            request(&mut stream, &mut reader, "show\n"),
            "1 70 10\n2 55 20\n"
        );
        assert_eq!(store.search(1).unwrap().quantity(), 70);
    }

    #[test]
    fn test_show_on_empty_store_sends_a_frame() {
        let (addr, _store, _gate) = start_pool(Vec::new(), 1);
        let (mut stream, mut reader) = connect(addr);
        assert_eq!(request(&mut stream, &mut reader, "show\n"), "");
        assert_eq!(request(&mut stream, &mut reader, "exit\n"), "exit\n");
    }

    #[test]
    fn test_pipelined_show_and_exit_stay_apart() {
        let (addr, _store, _gate) = start_pool(vec![(1, 1, 1), (2, 2, 2)], 1);
        let (mut stream, mut reader) = connect(addr);

        stream.write_all(b"show\nexit\n").unwrap();
        assert_eq!(read_reply(&mut reader), "1 1 1\n2 2 2\n");
        assert_eq!(read_reply(&mut reader), "exit\n");
    }

    #[test]
    fn test_overlong_line_is_cut_at_limit() {
        let (addr, store, _gate) = start_pool(vec![(1, 5, 5)], 1);
        let (mut stream, mut reader) = connect(addr);

        // 20000 bytes plus terminator: pieces of 8192, 8192 and 3617 bytes.
        let mut long = vec![b'x'; 20_000];
        long.push(b'\n');
        stream.write_all(&long).unwrap();
        for _ in 0..3 {
            assert_eq!(read_reply(&mut reader), "Invalid Command\n");
        }
        assert_eq!(request(&mut stream, &mut reader, "sell 1 1\n"), "[sell] success\n");
        assert_eq!(store.search(1).unwrap().quantity(), 6);
    }

    #[test]
    fn test_scenario_b_concurrent_buyers() {
        let (addr, store, _gate) = start_pool(vec![(1, 100, 10)], 4);
        let barrier = Arc::new(Barrier::new(2));

        let buyers: Vec<_> = (0..2)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let (mut stream, mut reader) = connect(addr);
                    barrier.wait();
                    request(&mut stream, &mut reader, "buy 1 50\n")
                })
            })
            .collect();

        for b in buyers {
            assert_eq!(b.join().unwrap(), "[buy] success\n");
        }
        assert_eq!(store.search(1).unwrap().quantity(), 0);

        let (mut stream, mut reader) = connect(addr);
        assert_eq!(
            request(&mut stream, &mut reader, "buy 1 1\n"),
            "Not enough left stock\n"
        );
    }

    #[test]
    fn test_no_lost_updates_across_clients() {
        let (addr, store, _gate) = start_pool(vec![(1, 1000, 1), (2, 0, 1)], 8);

        let clients: Vec<_> = (0..6)
            .map(|i| {
                thread::spawn(move || {
                    let (mut stream, mut reader) = connect(addr);
                    for _ in 0..50 {
                        let cmd = if i % 2 == 0 { "buy 1 3\n" } else { "sell 1 2\n" };
                        let reply = request(&mut stream, &mut reader, cmd);
                        assert!(reply.ends_with("success\n"), "reply {:?}", reply);
                        request(&mut stream, &mut reader, "sell 2 1\n");
                    }
                })
            })
            .collect();
        for c in clients {
            c.join().unwrap();
        }

        assert_eq!(store.search(1).unwrap().quantity(), 1000 - 3 * 150 + 2 * 150);
        assert_eq!(store.search(2).unwrap().quantity(), 300);
    }

    #[test]
    fn test_queued_connection_served_after_worker_frees() {
        // One worker: the second client waits in the queue until the first leaves.
        let (addr, _store, _gate) = start_pool(vec![(1, 5, 5)], 1);

        let (mut first, mut first_reader) = connect(addr);
        assert_eq!(request(&mut first, &mut first_reader, "exit\n"), "exit\n");

        let (mut second, mut second_reader) = connect(addr);
        second.write_all(b"show\n").unwrap();
        second
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = [0u8; 64];
        assert!(second.read(&mut buf).is_err());

        drop(first_reader);
        drop(first);

        second
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(read_reply(&mut second_reader), "1 5 5\n");
    }

    #[test]
    fn test_unterminated_last_line_is_served() {
        let (addr, store, _gate) = start_pool(vec![(4, 10, 1)], 1);
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"sell 4 5").unwrap();
        stream.shutdown(std::net::Shutdown::Write).unwrap();

        let mut reply = String::new();
        stream.read_to_string(&mut reply).unwrap();
        assert_eq!(reply, "[sell] success\n\n");
        assert_eq!(store.search(4).unwrap().quantity(), 15);
    }

    #[test]
    fn test_closed_gate_stops_trades() {
        let (addr, store, gate) = start_pool(vec![(1, 10, 1)], 2);
        let (mut stream, mut reader) = connect(addr);
        assert_eq!(request(&mut stream, &mut reader, "buy 1 5\n"), "[buy] success\n");

        gate.close();

        // The open connection is dropped instead of trading.
        stream.write_all(b"buy 1 5\n").unwrap();
        let mut rest = String::new();
        assert_eq!(reader.read_line(&mut rest).unwrap(), 0);

        // A new connection is accepted, then closed without service.
        let mut late = TcpStream::connect(addr).unwrap();
        late.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let _ = late.write_all(b"buy 1 5\n");
        let mut buf = [0u8; 16];
        assert_eq!(late.read(&mut buf).unwrap_or(0), 0);

        assert_eq!(store.search(1).unwrap().quantity(), 5);
    }
}
