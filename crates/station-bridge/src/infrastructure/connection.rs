//! One accepted TCP connection from a trading terminal.
//!
//! A [`Connection`] owns its socket, a bounded read buffer, the
//! [`FrameDecoder`] holding any partially received frame, and an output
//! queue.  It never blocks the relay loop: reads use `try_read` and writes
//! use `try_write`.
//!
//! # Output queue
//!
//! [`send`](Connection::send) appends the encoded frame to the output queue
//! and writes as much as the socket takes right now.  Whatever the kernel
//! does not accept stays queued and goes out on a later
//! [`flush`](Connection::flush), ahead of any newer frame, so frames never
//! interleave.  A slow reader only costs memory, up to the configured
//! pending-output cap.
//!
//! # Failure semantics
//!
//! Would-block and timeouts are routine and reported as "no progress".
//! Anything else (peer close, reset, an oversized inbound frame, an output
//! queue over its cap) marks the connection dead and is returned as a
//! [`ConnectionError`] so the registry can remove it.  A dead connection
//! refuses further I/O.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use station_core::{encode_frame, FrameDecoder, FrameError, Message};
use thiserror::Error;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::domain::BridgeConfig;

/// Registry-assigned handle of a connection.  Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reasons a connection is considered failed.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer closed its end of the stream (a read returned zero bytes).
    #[error("peer closed the connection")]
    Closed,

    /// The socket reported an I/O error other than would-block.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),

    /// The client stopped draining its socket and the queued output grew past
    /// the cap.
    #[error("{pending} bytes of output queued, limit is {max}")]
    OutputOverflow { pending: usize, max: usize },

    /// The peer sent an oversized unterminated frame.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// I/O was attempted on a connection that already failed.
    #[error("connection is already dead")]
    Dead,
}

/// Per-connection I/O limits, derived from [`BridgeConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub read_buffer_size: usize,
    pub max_frame_len: usize,
    pub max_pending_output: usize,
}

impl From<&BridgeConfig> for ConnectionSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            max_frame_len: config.max_frame_len,
            max_pending_output: config.max_pending_output,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

/// An accepted TCP socket plus its framing state.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: TcpStream,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    /// Encoded frames not yet accepted by the kernel; `out_buf[out_pos..]` is unsent.
    out_buf: Vec<u8>,
    out_pos: usize,
    max_pending_output: usize,
    alive: bool,
}

impl Connection {
    /// Wraps an accepted stream.  Socket options are the registry's concern.
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            id,
            peer_addr,
            stream,
            decoder: FrameDecoder::with_max_frame_len(settings.max_frame_len),
            read_buf: vec![0u8; settings.read_buffer_size.max(1)],
            out_buf: Vec::new(),
            out_pos: 0,
            max_pending_output: settings.max_pending_output,
            alive: true,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Number of bytes received since the last complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.decoder.residue().len()
    }

    /// Number of queued output bytes the client has not taken yet.
    pub fn pending_output(&self) -> usize {
        self.out_buf.len() - self.out_pos
    }

    pub fn has_pending_output(&self) -> bool {
        self.pending_output() > 0
    }

    /// Resolves once the socket can make progress: it has data, an EOF or an
    /// error to report, or (with queued output) it can take more bytes.
    pub async fn ready(&self) -> io::Result<()> {
        let interest = if self.has_pending_output() {
            Interest::READABLE.add(Interest::WRITABLE)
        } else {
            Interest::READABLE
        };
        self.stream.ready(interest).await.map(|_| ())
    }

    /// Performs at most one non-blocking read and decodes what it returned.
    ///
    /// Complete messages are appended to `inbound` in stream order; the
    /// return value is how many were appended.  A would-block read returns
    /// `Ok(0)`.  Messages completed by the same read that then overflowed the
    /// frame limit are still appended before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Closed`] when the peer closed the stream,
    /// [`ConnectionError::Io`] for socket errors and
    /// [`ConnectionError::Frame`] for an oversized frame.  The connection is
    /// dead afterwards.
    pub fn poll_readable(&mut self, inbound: &mut Vec<Message>) -> Result<usize, ConnectionError> {
        if !self.alive {
            return Err(ConnectionError::Dead);
        }

        let n = match self.stream.try_read(&mut self.read_buf) {
            Ok(0) => return Err(self.fail(ConnectionError::Closed)),
            Ok(n) => n,
            Err(e) if is_transient(&e) => return Ok(0),
            Err(e) => return Err(self.fail(ConnectionError::Io(e))),
        };

        trace!(conn = %self.id, bytes = n, "read from client");
        match self.decoder.feed_into(&self.read_buf[..n], inbound) {
            Ok(count) => Ok(count),
            Err(e) => Err(self.fail(ConnectionError::Frame(e))),
        }
    }

    /// Queues `message` followed by the frame terminator and writes what the
    /// socket accepts now.
    ///
    /// # Errors
    ///
    /// See [`send_frame`](Self::send_frame).
    pub fn send(&mut self, message: &Message) -> Result<(), ConnectionError> {
        let frame = encode_frame(message);
        self.send_frame(&frame)
    }

    /// Queues an already encoded frame behind any earlier output and writes
    /// what the socket accepts now.  The rest is written by later
    /// [`flush`](Self::flush) calls.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::OutputOverflow`] if the queue would exceed
    /// its cap and [`ConnectionError::Io`] for a hard write error; the
    /// connection is dead afterwards.  [`ConnectionError::Dead`] if it
    /// already was.
    pub fn send_frame(&mut self, frame: &[u8]) -> Result<(), ConnectionError> {
        if !self.alive {
            return Err(ConnectionError::Dead);
        }
        let pending = self.pending_output() + frame.len();
        if pending > self.max_pending_output {
            return Err(self.fail(ConnectionError::OutputOverflow {
                pending,
                max: self.max_pending_output,
            }));
        }
        if self.out_pos > 0 {
            self.out_buf.drain(..self.out_pos);
            self.out_pos = 0;
        }
        self.out_buf.extend_from_slice(frame);
        self.flush().map(|_| ())
    }

    /// Writes queued output until the socket would block or the queue is empty.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Io`] for a hard write error; the connection
    /// is dead afterwards.
    pub fn flush(&mut self) -> Result<usize, ConnectionError> {
        if !self.alive {
            return Err(ConnectionError::Dead);
        }
        let mut written = 0;
        while self.out_pos < self.out_buf.len() {
            match self.stream.try_write(&self.out_buf[self.out_pos..]) {
                Ok(0) => {
                    let e = io::Error::new(io::ErrorKind::WriteZero, "socket accepted no bytes");
                    return Err(self.fail(ConnectionError::Io(e)));
                }
                Ok(n) => {
                    self.out_pos += n;
                    written += n;
                }
                Err(e) if is_transient(&e) => break,
                Err(e) => return Err(self.fail(ConnectionError::Io(e))),
            }
        }
        if self.out_pos == self.out_buf.len() {
            self.out_buf.clear();
            self.out_pos = 0;
        }
        if written > 0 {
            trace!(conn = %self.id, bytes = written, pending = self.pending_output(), "wrote to client");
        }
        Ok(written)
    }

    fn fail(&mut self, error: ConnectionError) -> ConnectionError {
        if self.alive {
            debug!(conn = %self.id, peer = %self.peer_addr, "connection failed: {error}");
        }
        self.alive = false;
        error
    }

    /// Whether `TCP_NODELAY` is set on the underlying socket.
    #[cfg(test)]
    pub(crate) fn nodelay(&self) -> io::Result<bool> {
        self.stream.nodelay()
    }

    /// Shuts down the write half so the next write fails with a broken pipe.
    #[cfg(test)]
    pub(crate) async fn break_for_test(&mut self) {
        use tokio::io::AsyncWriteExt;
        let _ = self.stream.shutdown().await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("pending_bytes", &self.pending_bytes())
            .field("pending_output", &self.pending_output())
            .field("alive", &self.alive)
            .finish()
    }
}

/// Would-block, interrupted and timed-out socket calls mean "no progress",
/// not failure.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
