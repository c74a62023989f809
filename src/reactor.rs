//! Single-threaded, readiness-driven driver.
//!
//! One [`mio::Poll`] watches the listener, a [`mio::Waker`] used for
//! shutdown, and one token per occupied slot of a fixed connection table.
//! Every request is dispatched synchronously on the polling thread, so no
//! two commands ever run at the same time and the store needs no locking.
//!
//! Readiness is edge-triggered: a connection is served until its socket
//! would block, every complete line answered in arrival order before the
//! loop waits again. An idle client therefore never holds up the others.
//! A client that sends requests without reading replies stops being read
//! once [`MAX_PENDING_OUTPUT`] bytes are queued for it, and resumes when its
//! socket drains. The slot table is a hard ceiling; a client arriving while
//! it is full stops the server with [`ServerError::SlotsExhausted`].

use crate::defs::{EVENTS_CAPACITY, MAX_LINE_LEN, MAX_PENDING_OUTPUT, READ_CHUNK};
use crate::errors::ServerError;
use crate::protocol::handle_line;
use crate::record_lock::RecordLock;
use crate::store::Store;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

const LISTENER: Token = Token(usize::MAX);
const WAKER: Token = Token(usize::MAX - 1);

/// A client socket plus its unprocessed input and unsent output.
struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
    writable_interest: bool,
}

impl Connection {
    fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        Self {
            stream,
            addr,
            inbound: Vec::new(),
            outbound: Vec::new(),
            writable_interest: false,
        }
    }

    /// One read into `inbound`. `None` means the socket would block;
    /// `Some(0)` means the peer has closed its side.
    fn read_chunk(&mut self) -> io::Result<Option<usize>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    return Ok(Some(n));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Next line, terminator included, at most [`MAX_LINE_LEN`] bytes.
    ///
    /// With `eof` set, a trailing unterminated fragment counts as a line.
    fn next_line(&mut self, eof: bool) -> Option<Vec<u8>> {
        let end = match self.inbound.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1).min(MAX_LINE_LEN),
            None if self.inbound.len() >= MAX_LINE_LEN => MAX_LINE_LEN,
            None if eof && !self.inbound.is_empty() => self.inbound.len(),
            None => return None,
        };
        Some(self.inbound.drain(..end).collect())
    }

    /// Answers buffered lines and reads more until the socket would block,
    /// the peer closes, or too much output is pending. Input is only read
    /// once no complete line is buffered, so `inbound` stays under
    /// [`MAX_LINE_LEN`] plus one chunk.
    ///
    /// Returns `true` once the peer has closed and everything it sent has
    /// been answered.
    fn pump<L: RecordLock>(&mut self, store: &Store<L>) -> io::Result<bool> {
        let mut eof = false;
        loop {
            self.flush()?;
            if !eof && self.outbound.len() >= MAX_PENDING_OUTPUT {
                log::debug!("Pausing reads from {} until it drains", self.addr);
                return Ok(false);
            }

            if let Some(line) = self.next_line(eof) {
                log::debug!("server received {} bytes from {}", line.len(), self.addr);
                let reply = handle_line(store, &line);
                self.outbound.extend_from_slice(&reply.encode());
                continue;
            }
            if eof {
                return Ok(true);
            }

            match self.read_chunk()? {
                Some(0) => eof = true,
                Some(_) => {}
                None => return Ok(false),
            }
        }
    }

    /// Writes queued replies until done or the socket would block.
    fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Event-based stock server.
pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    slots: Vec<Option<Connection>>,
}

impl Reactor {
    /// Binds the listener and prepares a table of `max_clients` slots.
    pub fn bind(addr: SocketAddr, max_clients: usize) -> Result<Self, ServerError> {
        log::info!("Binding event-based server to address: {}", addr);
        let poll = Poll::new().map_err(|e| ServerError::PollError(e.to_string()))?;
        let mut listener =
            TcpListener::bind(addr).map_err(|e| ServerError::BindError(e.to_string()))?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(|e| ServerError::PollError(e.to_string()))?;
        let waker = Waker::new(poll.registry(), WAKER)
            .map_err(|e| ServerError::PollError(e.to_string()))?;

        Ok(Self {
            poll,
            listener,
            waker: Arc::new(waker),
            slots: (0..max_clients).map(|_| None).collect(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::BindError(e.to_string()))
    }

    /// Handle that makes [`Reactor::run`] return when woken.
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Number of occupied connection slots.
    pub fn active_clients(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Serves clients until the waker fires.
    ///
    /// Returns an error only for fatal conditions: the readiness wait failing
    /// or the slot table overflowing.
    pub fn run<L: RecordLock>(&mut self, store: &Store<L>) -> Result<(), ServerError> {
        log::info!(
            "Event-based server running with {} connection slots",
            self.slots.len()
        );
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::PollError(e.to_string()));
            }

            for event in events.iter() {
                match event.token() {
                    WAKER => {
                        log::info!(
                            "Shutdown requested, leaving event loop with {} clients",
                            self.active_clients()
                        );
                        return Ok(());
                    }
                    LISTENER => self.accept_pending()?,
                    Token(slot) => self.service(slot, store),
                }
            }
        }
    }

    fn accept_pending(&mut self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.admit(stream, addr)?,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("Failed to accept TCP connection: {}", e);
                    return Ok(());
                }
            }
        }
    }

    fn admit(&mut self, mut stream: TcpStream, addr: SocketAddr) -> Result<(), ServerError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(ServerError::SlotsExhausted(self.slots.len()))?;

        self.poll
            .registry()
            .register(&mut stream, Token(slot), Interest::READABLE)
            .map_err(|e| ServerError::PollError(e.to_string()))?;
        log::info!("Connected to ({}, {}) in slot {}", addr.ip(), addr.port(), slot);
        self.slots[slot] = Some(Connection::new(stream, addr));
        Ok(())
    }

    fn service<L: RecordLock>(&mut self, slot: usize, store: &Store<L>) {
        let Some(conn) = self.slots.get_mut(slot).and_then(Option::as_mut) else {
            return;
        };

        let peer_closed = match conn.pump(store) {
            Ok(closed) => closed,
            Err(e) => {
                log::warn!("Client IO error for {}: {}", conn.addr, e);
                self.close(slot);
                return;
            }
        };
        if peer_closed {
            self.close(slot);
            return;
        }

        let wants_write = !conn.outbound.is_empty();
        if wants_write != conn.writable_interest {
            let interest = if wants_write {
                Interest::READABLE | Interest::WRITABLE
            } else {
                Interest::READABLE
            };
            if let Err(e) = self
                .poll
                .registry()
                .reregister(&mut conn.stream, Token(slot), interest)
            {
                log::warn!("Failed to update interest for {}: {}", conn.addr, e);
                self.close(slot);
                return;
            }
            conn.writable_interest = wants_write;
        }
    }

    fn close(&mut self, slot: usize) {
        if let Some(mut conn) = self.slots[slot].take() {
            if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
                log::debug!("Deregister failed for {}: {}", conn.addr, e);
            }
            log::info!("Client {} closed connection, slot {} freed", conn.addr, slot);
        }
    }
}
