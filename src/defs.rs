/// Default snapshot file holding one `<id> <quantity> <price>` line per stock.
///
/// Loaded once at startup and fully rewritten on orderly shutdown.
pub const DEFAULT_STOCK_FILE: &str = "stock.txt";

/// Default number of worker threads spawned by the thread-pool driver.
pub const DEFAULT_WORKERS: usize = 1000;

/// Default capacity of the pending-connection queue between the acceptor
/// and the worker threads.
///
/// When the queue is full, the acceptor blocks and stops accepting.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default size of the reactor's connection slot table.
///
/// Admitting a client while every slot is taken is fatal.
pub const DEFAULT_MAX_CLIENTS: usize = 1024;

/// Longest request line. Longer input is cut into pieces of this size, each
/// dispatched as a line of its own.
pub const MAX_LINE_LEN: usize = 8192;

/// Unsent reply bytes a reactor connection may hold before the reactor stops
/// reading that client until the peer catches up.
pub const MAX_PENDING_OUTPUT: usize = 64 * 1024;

/// Size of the scratch buffer used for each non-blocking socket read.
pub const READ_CHUNK: usize = 4096;

/// Number of readiness events fetched per reactor wake-up.
pub const EVENTS_CAPACITY: usize = 256;

/// Reply to a `buy` that was applied.
pub const BUY_SUCCESS_MSG: &str = "[buy] success\n";

/// Reply to a `buy` asking for more than the remaining quantity.
pub const BUY_ERROR_MSG: &str = "Not enough left stock\n";

/// Reply to a `sell` that was applied.
pub const SELL_SUCCESS_MSG: &str = "[sell] success\n";

/// Reply to a `buy`/`sell` naming an id that was never loaded.
pub const UNKNOWN_ID_MSG: &str = "No such stock id\n";

/// Reply to a `sell` that would overflow the stored quantity.
pub const OVERFLOW_MSG: &str = "Quantity overflow\n";

/// Reply to anything that is not a recognised command.
pub const ERROR_MSG: &str = "Invalid Command\n";

/// Sentinel reply to `exit`. The client closes the connection on receipt.
pub const EXIT_MSG: &str = "exit\n";

/// Written after every reply body. Bodies never contain an empty line, so the
/// first empty line a client reads ends the reply.
pub const REPLY_TERMINATOR: &str = "\n";
