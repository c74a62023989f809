//! Per-record synchronization disciplines.
//!
//! Every [`Record`](crate::record::Record) keeps its mutable quantity behind a
//! [`RecordLock`]. Two disciplines exist:
//!
//! - [`ReaderPreferring`] for the thread-pool driver: the first-readers-writers
//!   protocol built from a reader count, a guard over that count, and a
//!   writer-exclusion semaphore.
//! - [`Unguarded`] for the reactor driver, which already serializes every
//!   command on one thread. It is `!Sync`, so a store using it cannot be
//!   shared across threads by mistake.
//!
//! # Starvation
//!
//! [`ReaderPreferring`] lets readers in as long as any reader is active. A
//! continuous stream of overlapping `show` requests on a record can therefore
//! delay a waiting `buy`/`sell` on that record indefinitely.

use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// Read/write access to a single record's quantity.
pub trait RecordLock {
    /// Wraps the initial quantity.
    fn new(quantity: i64) -> Self;

    /// Returns the quantity through the read path.
    fn read(&self) -> i64;

    /// Runs `f` with exclusive access to the quantity.
    fn write<R>(&self, f: impl FnOnce(&mut i64) -> R) -> R;
}

/// Binary semaphore.
///
/// Unlike a mutex guard, a permit taken on one thread may be released on
/// another, which the last-reader hand-off requires.
#[derive(Debug)]
pub struct Semaphore {
    available: Mutex<bool>,
    released: Condvar,
}

impl Semaphore {
    /// Creates an unlocked semaphore.
    pub fn new() -> Self {
        Self {
            available: Mutex::new(true),
            released: Condvar::new(),
        }
    }

    /// Blocks until the permit is free, then takes it.
    pub fn acquire(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*available {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available = false;
    }

    /// Returns the permit and wakes one waiter.
    pub fn release(&self) {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *available = true;
        self.released.notify_one();
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the writer permit when dropped, so a panicking writer cannot
/// leave the record locked.
struct WriterPermit<'a>(&'a Semaphore);

impl<'a> WriterPermit<'a> {
    fn acquire(sem: &'a Semaphore) -> Self {
        sem.acquire();
        WriterPermit(sem)
    }
}

impl Drop for WriterPermit<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// First-readers-writers lock around one quantity.
///
/// Lock order is always `readers` guard, then `writer`; no path holds locks
/// of two different records at once.
///
/// The quantity is only touched while the writer permit is held, either by
/// the reader group or by one writer. The permit's mutex already orders those
/// accesses, so relaxed atomic loads and stores suffice.
#[derive(Debug)]
pub struct ReaderPreferring {
    readers: Mutex<usize>,
    writer: Semaphore,
    quantity: AtomicI64,
}

impl ReaderPreferring {
    /// Number of readers currently inside the read section.
    pub fn active_readers(&self) -> usize {
        *self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter_read(&self) {
        let mut readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        *readers += 1;
        if *readers == 1 {
            self.writer.acquire();
        }
    }

    fn leave_read(&self) {
        let mut readers = self.readers.lock().unwrap_or_else(PoisonError::into_inner);
        *readers -= 1;
        if *readers == 0 {
            self.writer.release();
        }
    }
}

impl RecordLock for ReaderPreferring {
    fn new(quantity: i64) -> Self {
        Self {
            readers: Mutex::new(0),
            writer: Semaphore::new(),
            quantity: AtomicI64::new(quantity),
        }
    }

    fn read(&self) -> i64 {
        self.enter_read();
        let quantity = self.quantity.load(Ordering::Relaxed);
        self.leave_read();
        quantity
    }

    fn write<R>(&self, f: impl FnOnce(&mut i64) -> R) -> R {
        let _permit = WriterPermit::acquire(&self.writer);
        let mut quantity = self.quantity.load(Ordering::Relaxed);
        let result = f(&mut quantity);
        self.quantity.store(quantity, Ordering::Relaxed);
        result
    }
}

/// Lock-free cell for single-threaded drivers.
#[derive(Debug)]
pub struct Unguarded(Cell<i64>);

impl RecordLock for Unguarded {
    fn new(quantity: i64) -> Self {
        Unguarded(Cell::new(quantity))
    }

    fn read(&self) -> i64 {
        self.0.get()
    }

    fn write<R>(&self, f: impl FnOnce(&mut i64) -> R) -> R {
        let mut quantity = self.0.get();
        let result = f(&mut quantity);
        self.0.set(quantity);
        result
    }
}
