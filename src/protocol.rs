//! Line protocol shared by both drivers.
//!
//! ```text
//! show                 -> "<id> <quantity> <price>\n" for every record, load order
//! buy  <id> <amount>   -> "[buy] success\n" | "Not enough left stock\n"
//! sell <id> <amount>   -> "[sell] success\n"
//! exit                 -> "exit\n" (the client closes the connection)
//! anything else        -> "Invalid Command\n"
//! ```
//!
//! Commands are case-sensitive. Tokens after the required ones are ignored.
//!
//! Every reply body is followed by an empty line, so a `show` on an empty
//! store still sends one frame (`"\n"`) and pipelined replies stay apart.

use crate::defs::{
    BUY_ERROR_MSG, BUY_SUCCESS_MSG, ERROR_MSG, EXIT_MSG, OVERFLOW_MSG, REPLY_TERMINATOR,
    SELL_SUCCESS_MSG, UNKNOWN_ID_MSG,
};
use crate::errors::TradeError;
use crate::record_lock::RecordLock;
use crate::store::Store;

use std::fmt::{self, Write};

/// A parsed request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// List every record.
    Show,
    /// Take `amount` of `id` out of stock.
    Buy {
        /// Record key.
        id: i64,
        /// Units requested.
        amount: i64,
    },
    /// Put `amount` of `id` into stock.
    Sell {
        /// Record key.
        id: i64,
        /// Units returned.
        amount: i64,
    },
    /// Ask the server for the exit sentinel.
    Exit,
    /// Empty or unrecognised line.
    Invalid,
}

impl Command {
    /// Parses one request line. Never fails; bad input is [`Command::Invalid`].
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("show") => Command::Show,
            Some("exit") => Command::Exit,
            Some("buy") => match parse_trade(&mut tokens) {
                Some((id, amount)) => Command::Buy { id, amount },
                None => Command::Invalid,
            },
            Some("sell") => match parse_trade(&mut tokens) {
                Some((id, amount)) => Command::Sell { id, amount },
                None => Command::Invalid,
            },
            _ => Command::Invalid,
        }
    }
}

fn parse_trade<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<(i64, i64)> {
    let id = tokens.next()?.parse().ok()?;
    let amount: i64 = tokens.next()?.parse().ok()?;
    (amount >= 0).then_some((id, amount))
}

/// Response to one command. [`fmt::Display`] renders the body;
/// [`Reply::encode`] adds the terminator that goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Output of `show`.
    Listing(String),
    /// `buy` applied.
    Bought,
    /// `buy` refused, quantity unchanged.
    InsufficientStock,
    /// `sell` applied.
    Sold,
    /// No record under the requested id.
    UnknownId,
    /// `sell` refused, quantity unchanged.
    Overflow,
    /// Exit sentinel.
    Exit,
    /// Unrecognised command.
    Invalid,
}

impl Reply {
    /// Wire frame: the body followed by [`REPLY_TERMINATOR`]. Sent with one
    /// write.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = self.to_string().into_bytes();
        frame.extend_from_slice(REPLY_TERMINATOR.as_bytes());
        frame
    }

    fn from_trade(result: Result<i64, TradeError>, success: Reply) -> Self {
        match result {
            Ok(_) => success,
            Err(TradeError::UnknownId(_)) => Reply::UnknownId,
            Err(TradeError::InsufficientStock { .. }) => Reply::InsufficientStock,
            Err(TradeError::QuantityOverflow) => Reply::Overflow,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reply::Listing(listing) => listing.as_str(),
            Reply::Bought => BUY_SUCCESS_MSG,
            Reply::InsufficientStock => BUY_ERROR_MSG,
            Reply::Sold => SELL_SUCCESS_MSG,
            Reply::UnknownId => UNKNOWN_ID_MSG,
            Reply::Overflow => OVERFLOW_MSG,
            Reply::Exit => EXIT_MSG,
            Reply::Invalid => ERROR_MSG,
        };
        f.write_str(text)
    }
}

/// Executes `command` against `store`.
///
/// Each record is locked on its own, so `show` is consistent per line, not
/// across the whole listing.
pub fn dispatch<L: RecordLock>(store: &Store<L>, command: Command) -> Reply {
    match command {
        Command::Show => Reply::Listing(show(store)),
        Command::Buy { id, amount } => Reply::from_trade(
            store
                .search(id)
                .ok_or(TradeError::UnknownId(id))
                .and_then(|record| record.buy(amount)),
            Reply::Bought,
        ),
        Command::Sell { id, amount } => Reply::from_trade(
            store
                .search(id)
                .ok_or(TradeError::UnknownId(id))
                .and_then(|record| record.sell(amount)),
            Reply::Sold,
        ),
        Command::Exit => Reply::Exit,
        Command::Invalid => Reply::Invalid,
    }
}

/// Parses and executes one raw request line.
pub fn handle_line<L: RecordLock>(store: &Store<L>, line: &[u8]) -> Reply {
    let text = String::from_utf8_lossy(line);
    let command = Command::parse(&text);
    log::debug!("Dispatching {:?}", command);
    dispatch(store, command)
}

fn show<L: RecordLock>(store: &Store<L>) -> String {
    let mut listing = String::new();
    for record in store.enumerate() {
        let (id, quantity, price) = record.snapshot();
        // Writing into a String cannot fail.
        let _ = writeln!(listing, "{} {} {}", id, quantity, price);
    }
    listing
}
