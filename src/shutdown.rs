//! Interrupt listening and the request gate closed before the final flush.

use crate::errors::ServerError;

use std::sync::{PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// Runs `on_interrupt` once the process receives Ctrl+C / `SIGINT`.
///
/// The signal is awaited on a dedicated thread with a single-threaded
/// `tokio` runtime. The callback runs on that thread in normal execution
/// context, never inside a signal handler, so it may do I/O, lock, or wake
/// another thread's event loop.
pub fn on_interrupt<F>(on_interrupt: F) -> Result<JoinHandle<()>, ServerError>
where
    F: FnOnce() + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ServerError::SignalError(e.to_string()))?;

    thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                log::info!("Interrupt received, shutting down");
                on_interrupt();
            }
            Err(e) => log::error!("Failed to listen for interrupt: {}", e),
        })
        .map_err(|e| ServerError::SpawnError(e.to_string()))
}

/// Admission gate for requests.
///
/// Workers run each dispatch through [`Gate::admit`]; any number of them may
/// be inside at once. [`Gate::close`] waits for those in flight and refuses
/// everything after, so a store flushed after `close` returns holds every
/// trade that was ever confirmed.
#[derive(Debug, Default)]
pub struct Gate {
    closed: RwLock<bool>,
}

impl Gate {
    /// Creates an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` unless the gate is closed. `None` means it was refused.
    pub fn admit<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return None;
        }
        Some(f())
    }

    /// Refuses new work, returning once admitted work has finished.
    pub fn close(&self) {
        *self.closed.write().unwrap_or_else(PoisonError::into_inner) = true;
        log::info!("Request gate closed");
    }

    /// `true` once [`Gate::close`] has run.
    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }
}
