//! # Stock Server
//!
//! TCP stock trading server over an in-memory ledger loaded from a snapshot
//! file. Runs one of two concurrency drivers:
//!
//! - `thread` (default): acceptor thread, bounded queue, worker pool,
//!   per-record reader/writer locks.
//! - `event`: single-threaded readiness loop, no locking.
//!
//! On Ctrl+C the server stops taking requests, lets the ones already running
//! finish, writes the ledger back to the snapshot file and exits with
//! status 0. Clients are disconnected without further replies.
//!
//! ## Command-line Options
//! - `<port>`: TCP port to listen on (required).
//! - `--mode` / `-m`: `thread` or `event`.
//! - `--stock-file` / `-s`: snapshot path (default `stock.txt`).
//! - `--workers` / `-w`, `--queue-capacity` / `-q`: thread-based sizing.
//! - `--max-clients` / `-c`: event-based slot table size.
//! - `--log-level` / `-l`: `error`, `warn`, `info`, `debug`, `trace`.

use stock_server::defs::{
    DEFAULT_MAX_CLIENTS, DEFAULT_QUEUE_CAPACITY, DEFAULT_STOCK_FILE, DEFAULT_WORKERS,
};
use stock_server::errors::CliError;
use stock_server::persistence::{flush_store, load_store};
use stock_server::reactor::Reactor;
use stock_server::record_lock::{ReaderPreferring, Unguarded};
use stock_server::shutdown;
use stock_server::store::Store;
use stock_server::thread_pool::ThreadPoolServer;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{mpsc, Arc};
use structopt::StructOpt;

/// Concurrency driver selected on the command line.
#[derive(Debug, Clone, Copy)]
enum Mode {
    Thread,
    Event,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thread" => Ok(Mode::Thread),
            "event" => Ok(Mode::Event),
            other => Err(format!("unknown mode '{}', expected thread or event", other)),
        }
    }
}

fn parse_nonzero(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Command-line options for the Stock Server
#[derive(Debug, StructOpt)]
#[structopt(name = "stock_server", about = "Concurrent TCP stock trading server")]
struct Opt {
    /// TCP port to listen on
    port: u16,

    /// Concurrency driver: thread or event
    #[structopt(short, long, default_value = "thread")]
    mode: Mode,

    /// Snapshot file loaded at startup and rewritten on shutdown [default: stock.txt]
    #[structopt(short, long, parse(from_os_str))]
    stock_file: Option<PathBuf>,

    /// Worker threads, thread mode only [default: 1000]
    #[structopt(short, long, parse(try_from_str = parse_nonzero))]
    workers: Option<usize>,

    /// Pending connection queue capacity, thread mode only [default: 1000]
    #[structopt(short, long, parse(try_from_str = parse_nonzero))]
    queue_capacity: Option<usize>,

    /// Connection slot table size, event mode only [default: 1024]
    #[structopt(short = "c", long, parse(try_from_str = parse_nonzero))]
    max_clients: Option<usize>,

    /// Log level: error, warn, info, debug, trace
    #[structopt(short, long, default_value = "info")]
    log_level: String,
}

/// Initializes the logger using env_logger with the given level
fn init_logger(level: &str) -> Result<(), CliError> {
    let mut builder = env_logger::Builder::new();

    let log_level = match level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    builder.filter_level(log_level);
    builder.format_timestamp_micros();
    builder.format_module_path(false);
    builder.format_target(false);
    builder
        .try_init()
        .map_err(|e| CliError::GeneralError(e.to_string()))
}

impl Opt {
    fn stock_file(&self) -> PathBuf {
        self.stock_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STOCK_FILE))
    }
}

fn run_thread_based(opt: &Opt, addr: SocketAddr, stock_file: &Path) -> Result<(), CliError> {
    let store: Arc<Store<ReaderPreferring>> = Arc::new(load_store(stock_file)?);

    let (tx, rx) = mpsc::channel();
    let _interrupt = shutdown::on_interrupt(move || {
        let _ = tx.send(());
    })?;

    let server = ThreadPoolServer::bind(
        addr,
        store.clone(),
        opt.workers.unwrap_or(DEFAULT_WORKERS),
        opt.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
    )?;
    let gate = server.gate();
    server.start()?;
    log::info!("Thread-based server listening on {}", addr);

    rx.recv()
        .map_err(|e| CliError::GeneralError(e.to_string()))?;

    gate.close();
    flush_store(stock_file, &store)?;
    Ok(())
}

fn run_event_based(opt: &Opt, addr: SocketAddr, stock_file: &Path) -> Result<(), CliError> {
    let store: Store<Unguarded> = load_store(stock_file)?;

    let mut reactor = Reactor::bind(addr, opt.max_clients.unwrap_or(DEFAULT_MAX_CLIENTS))?;
    let waker = reactor.waker();
    let _interrupt = shutdown::on_interrupt(move || {
        if let Err(e) = waker.wake() {
            log::error!("Failed to wake event loop: {}", e);
        }
    })?;

    reactor.run(&store)?;

    flush_store(stock_file, &store)?;
    Ok(())
}

fn main() {
    let opt = Opt::from_args();

    if let Err(e) = init_logger(&opt.log_level) {
        eprintln!("{}", e);
    }
    log::debug!("Command line options: {:?}", opt);

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, opt.port));
    let stock_file = opt.stock_file();
    let result = match opt.mode {
        Mode::Thread => run_thread_based(&opt, addr, &stock_file),
        Mode::Event => run_event_based(&opt, addr, &stock_file),
    };

    match result {
        Ok(()) => {
            println!(
                "\nServer has terminated with '{}' update!",
                stock_file.display()
            );
            // Workers may still be blocked on sockets; do not wait for them.
            std::process::exit(0);
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
