//! # Concurrent Stock Server
//!
//! This crate implements an in-memory stock ledger served to many TCP
//! clients over a small line protocol, with two interchangeable concurrency
//! drivers over the same store:
//!
//! - an **event-based** driver ([`reactor`](crate::reactor)): one thread,
//!   one readiness set, every command executed to completion before the next;
//! - a **thread-based** driver ([`thread_pool`](crate::thread_pool)): an
//!   acceptor thread feeding a bounded queue and a fixed pool of workers that
//!   mutate records under per-record reader/writer locks.
//!
//! ## Architecture Overview
//!
//! - [`store`](crate::store) — AVL-indexed records plus load-order index.
//! - [`record`](crate::record) — A stock record and its buy/sell rules.
//! - [`record_lock`](crate::record_lock) — Reader-preferring and no-op locking disciplines.
//! - [`bounded_queue`](crate::bounded_queue) — Bounded connection queue (`crossbeam` channel).
//! - [`protocol`](crate::protocol) — Command parsing and dispatch.
//! - [`persistence`](crate::persistence) — Snapshot load and flush.
//! - [`shutdown`](crate::shutdown) — Interrupt listener and request gate.
//! - [`defs`](crate::defs) — Shared constants.
//! - [`errors`](crate::errors) — Error types used across modules.
//!
//! ## TCP Protocol
//!
//! - `show` — one `<id> <quantity> <price>` line per record, in load order.
//! - `buy <id> <amount>` — `[buy] success` or `Not enough left stock`.
//! - `sell <id> <amount>` — `[sell] success`.
//! - `exit` — `exit`; the client is expected to close the connection.
//! - Anything else — `Invalid Command`.
//!
//! Unknown ids are answered with `No such stock id`. Every reply body is
//! followed by an empty line that marks its end.
//!
//! ## Example: Running the Thread-Based Server
//!
//! ```no_run
//! use std::sync::Arc;
//! use stock_server::persistence::{flush_store, load_store};
//! use stock_server::record_lock::ReaderPreferring;
//! use stock_server::store::Store;
//! use stock_server::thread_pool::ThreadPoolServer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store: Arc<Store<ReaderPreferring>> = Arc::new(load_store("stock.txt")?);
//!
//!     let server = ThreadPoolServer::bind("0.0.0.0:3333".parse()?, store.clone(), 8, 32)?;
//!     let gate = server.gate();
//!     server.start()?;
//!
//!     let (tx, rx) = std::sync::mpsc::channel();
//!     let _interrupt = stock_server::shutdown::on_interrupt(move || {
//!         let _ = tx.send(());
//!     })?;
//!     rx.recv()?;
//!
//!     gate.close();
//!     flush_store("stock.txt", &store)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unreachable_pub)]

pub mod bounded_queue;
pub mod defs;
pub mod errors;
pub mod persistence;
pub mod protocol;
pub mod reactor;
pub mod record;
pub mod record_lock;
pub mod shutdown;
pub mod store;
pub mod thread_pool;
