use crate::errors::TradeError;
use crate::record_lock::{ReaderPreferring, RecordLock};

/// A single stock line of the ledger.
///
/// `id` and `price` never change after load. `quantity` is only reached
/// through the record's [`RecordLock`], so every read and write follows the
/// active driver's discipline.
#[derive(Debug)]
pub struct Record<L = ReaderPreferring> {
    id: i64,
    price: i64,
    quantity: L,
}

impl<L: RecordLock> Record<L> {
    /// Creates a record with its initial quantity.
    pub fn new(id: i64, quantity: i64, price: i64) -> Self {
        Self {
            id,
            price,
            quantity: L::new(quantity),
        }
    }

    /// Unique key of the record.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Remaining quantity, read through the read path.
    pub fn quantity(&self) -> i64 {
        self.quantity.read()
    }

    /// `(id, quantity, price)` as of one instant.
    pub fn snapshot(&self) -> (i64, i64, i64) {
        (self.id, self.quantity.read(), self.price)
    }

    /// Takes `amount` out of stock if enough is left.
    ///
    /// The check and the subtraction happen under one writer section.
    /// Returns the quantity left afterwards.
    pub fn buy(&self, amount: i64) -> Result<i64, TradeError> {
        self.quantity.write(|quantity| {
            if amount > *quantity {
                return Err(TradeError::InsufficientStock {
                    requested: amount,
                    available: *quantity,
                });
            }
            *quantity -= amount;
            Ok(*quantity)
        })
    }

    /// Adds `amount` to stock. Returns the new quantity.
    pub fn sell(&self, amount: i64) -> Result<i64, TradeError> {
        self.quantity.write(|quantity| {
            *quantity = quantity
                .checked_add(amount)
                .ok_or(TradeError::QuantityOverflow)?;
            Ok(*quantity)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_lock::Unguarded;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_buy_within_stock() {
        let record: Record = Record::new(1, 100, 10);
        assert_eq!(record.buy(30), Ok(70));
        assert_eq!(record.quantity(), 70);
        assert_eq!(record.buy(70), Ok(0));
    }

    #[test]
    fn test_buy_beyond_stock_leaves_quantity() {
        let record: Record<Unguarded> = Record::new(1, 70, 10);
        assert_eq!(
            record.buy(1000),
            Err(TradeError::InsufficientStock {
                requested: 1000,
                available: 70
            })
        );
        assert_eq!(record.snapshot(), (1, 70, 10));
    }

    #[test]
    fn test_sell_is_additive() {
        let record: Record<Unguarded> = Record::new(2, 50, 20);
        assert_eq!(record.sell(5), Ok(55));
        assert_eq!(record.sell(0), Ok(55));
    }

    #[test]
    fn test_sell_overflow_rejected() {
        let record: Record<Unguarded> = Record::new(3, i64::MAX - 1, 1);
        assert_eq!(record.sell(2), Err(TradeError::QuantityOverflow));
        assert_eq!(record.quantity(), i64::MAX - 1);
    }

    #[test]
    fn test_mixed_writers_compose_serially() {
        // 4 buyers take 10 units each, 4 sellers add 5 each, 250 rounds.
        let record: Arc<Record> = Arc::new(Record::new(9, 100_000, 1));
        let mut handles = Vec::new();
        for i in 0..8 {
            let record = record.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..250 {
                    if i % 2 == 0 {
                        record.buy(10).unwrap();
                    } else {
                        record.sell(5).unwrap();
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(record.quantity(), 100_000 - 4 * 250 * 10 + 4 * 250 * 5);
    }

    #[test]
    fn test_readers_never_see_torn_values() {
        // Writers only ever move between 500 and 400.
        let record: Arc<Record> = Arc::new(Record::new(5, 500, 1));
        let writer = {
            let record = record.clone();
            thread::spawn(move || {
                for _ in 0..2000 {
                    record.buy(100).unwrap();
                    record.sell(100).unwrap();
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let record = record.clone();
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let q = record.quantity();
                        assert!(q == 500 || q == 400, "observed {}", q);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(record.quantity(), 500);
    }
}
