use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the [`Store`](crate::store::Store).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The same stock id was inserted twice.
    ///
    /// Ids are unique keys of the AVL index; a snapshot containing a
    /// repeated id is corrupt.
    #[error("duplicate stock id {0}")]
    DuplicateId(i64),
}

/// Errors from reading or writing the stock snapshot file.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The snapshot file does not exist or cannot be opened.
    #[error("stock file {path:?} cannot be opened: {source}")]
    Missing {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying open failure.
        source: std::io::Error,
    },

    /// A line is not three whitespace-separated integers with a
    /// non-negative quantity.
    #[error("malformed stock line {line}: '{content}'")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// Offending line content.
        content: String,
    },

    /// Read or write failure after the file was opened.
    #[error("stock file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot could not be indexed.
    #[error("stock file rejected: {0}")]
    Store(#[from] StoreError),
}

/// Per-request trading failures.
///
/// These never terminate a connection; the
/// [`protocol`](crate::protocol) layer turns them into replies.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TradeError {
    /// No record is indexed under this id.
    #[error("unknown stock id {0}")]
    UnknownId(i64),

    /// A `buy` asked for more than is left.
    #[error("requested {requested} but only {available} left")]
    InsufficientStock {
        /// Amount the client asked for.
        requested: i64,
        /// Quantity at the moment of the check.
        available: i64,
    },

    /// A `sell` would push the quantity past `i64::MAX`.
    #[error("quantity overflow")]
    QuantityOverflow,
}

/// Errors produced by either network driver.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("Failed to bind TCP listener: {0}")]
    BindError(String),

    /// I/O error on a single client connection.
    #[error("Client IO error: {0}")]
    ClientIoError(String),

    /// The readiness wait or registration failed.
    #[error("Readiness polling failed: {0}")]
    PollError(String),

    /// Every reactor slot is occupied and another client arrived.
    #[error("Connection slot table exhausted ({0} slots)")]
    SlotsExhausted(usize),

    /// The interrupt listener could not be installed.
    #[error("Failed to install interrupt listener: {0}")]
    SignalError(String),

    /// A driver thread could not be spawned.
    #[error("Failed to spawn thread: {0}")]
    SpawnError(String),
}

/// High-level errors returned by the server and client binaries.
#[derive(Error, Debug)]
pub enum CliError {
    /// General wrapper around any textual failure.
    #[error("Cli failed with error: {0}")]
    GeneralError(String),
}

impl From<PersistenceError> for CliError {
    fn from(err: PersistenceError) -> Self {
        CliError::GeneralError(err.to_string())
    }
}

impl From<ServerError> for CliError {
    fn from(err: ServerError) -> Self {
        CliError::GeneralError(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::GeneralError(err.to_string())
    }
}
