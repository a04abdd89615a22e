//! ConnectionRegistry: the TCP listener and the live connection set.
//!
//! The registry is owned by the relay loop and is the only place connections
//! are created or destroyed.  Every operation that touches the whole set
//! tolerates partial failure: failing connections are collected while
//! iterating and removed in one pass afterwards, so the set is never mutated
//! mid-iteration and a removed connection is never visited again.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::future::select_all;
use futures_util::FutureExt;
use station_core::{encode_frame, Message};
use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::{BridgeConfig, ErrorIsolation};
use crate::infrastructure::connection::{
    Connection, ConnectionError, ConnectionId, ConnectionSettings,
};

/// Error type for listener setup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read the listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Result of one [`ConnectionRegistry::poll_all`] round.
#[derive(Debug, Default)]
pub struct PollOutcome {
    /// Complete messages, per-connection order preserved.
    pub messages: Vec<Message>,
    /// Connections removed because they failed during this round.
    pub disconnected: usize,
}

/// Result of one [`ConnectionRegistry::broadcast`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that took the frame, fully written or queued behind
    /// earlier output.
    pub delivered: usize,
    /// Connections that failed and were removed.
    pub failed: usize,
}

/// Owns the listening socket and every live [`Connection`].
pub struct ConnectionRegistry {
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: u64,
    settings: ConnectionSettings,
    read_timeout: Duration,
    error_isolation: ErrorIsolation,
}

impl ConnectionRegistry {
    /// Binds the client listener described by `config`.
    ///
    /// `SO_REUSEADDR` and `SO_KEEPALIVE` are set before binding; accepted
    /// sockets inherit keep-alive from the listener.  Option failures are
    /// logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::BindFailed`] if the socket cannot be created,
    /// bound or put into listening mode.
    pub fn bind(config: &BridgeConfig) -> Result<Self, RegistryError> {
        let addr = config.listen_addr;
        let bind_failed = |source| RegistryError::BindFailed { addr, source };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_failed)?;

        if let Err(e) = socket.set_reuseaddr(true) {
            warn!("could not set SO_REUSEADDR on {addr}: {e}");
        }
        if let Err(e) = socket.set_keepalive(true) {
            warn!("could not set SO_KEEPALIVE on {addr}: {e}");
        }

        socket.bind(addr).map_err(bind_failed)?;
        let listener = socket.listen(config.listen_backlog).map_err(bind_failed)?;
        Self::from_listener(listener, config)
    }

    /// Wraps an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LocalAddr`] if the listener address cannot be read.
    pub fn from_listener(listener: TcpListener, config: &BridgeConfig) -> Result<Self, RegistryError> {
        let local_addr = listener.local_addr().map_err(RegistryError::LocalAddr)?;
        info!("listening for trading clients on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            connections: BTreeMap::new(),
            next_id: 0,
            settings: ConnectionSettings::from(config),
            read_timeout: config.read_timeout,
            error_isolation: config.error_isolation,
        })
    }

    /// The address the listener is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Handles of all live connections, in accept order.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Accepts every connection already waiting on the listener without blocking.
    ///
    /// Returns the number of connections added.  "Nothing pending" is the
    /// normal case, not an error; an accept error is logged and ends this call.
    pub fn accept_pending(&mut self) -> usize {
        let mut accepted = 0;
        loop {
            match self.listener.accept().now_or_never() {
                None => break,
                Some(Ok((stream, peer))) => {
                    self.register(stream, peer);
                    accepted += 1;
                }
                Some(Err(e)) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
        accepted
    }

    /// Adds an accepted stream to the live set and returns its handle.
    pub fn register(&mut self, stream: TcpStream, peer: SocketAddr) -> ConnectionId {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("could not set TCP_NODELAY for {peer}: {e}");
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections
            .insert(id, Connection::new(id, stream, peer, self.settings));
        info!(
            "client {id} connected from {peer}; now {} connected",
            self.connections.len()
        );
        id
    }

    /// Waits up to the read timeout for any connection to make progress, then
    /// reads once from every connection, flushes queued output, and returns
    /// the decoded messages.
    ///
    /// A connection makes progress when it has data to read or, if output is
    /// queued for it, when it can take more bytes.  Connections that fail are
    /// removed after the round.  With [`ErrorIsolation::PerBatch`] the first
    /// failure ends the round early.
    pub async fn poll_all(&mut self) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        if self.connections.is_empty() {
            return outcome;
        }

        let any_ready = {
            let waits = self.connections.values().map(|c| Box::pin(c.ready()));
            timeout(self.read_timeout, select_all(waits)).await.is_ok()
        };
        if !any_ready {
            return outcome;
        }

        let mut failed = Vec::new();
        for (id, conn) in self.connections.iter_mut() {
            let result = conn.poll_readable(&mut outcome.messages).and_then(|_| {
                if conn.has_pending_output() {
                    conn.flush()?;
                }
                Ok(())
            });
            if let Err(e) = result {
                failed.push((*id, e));
                if self.error_isolation == ErrorIsolation::PerBatch {
                    break;
                }
            }
        }

        outcome.disconnected = self.remove_failed(failed);
        if !outcome.messages.is_empty() {
            debug!("received {} message(s) from clients", outcome.messages.len());
        }
        outcome
    }

    /// Queues `message` for every live connection and writes what each
    /// socket takes right now.  Never waits.
    ///
    /// The frame is encoded once.  Output a slow client cannot take yet stays
    /// queued on that connection and is flushed by later [`poll_all`] rounds.
    /// A failing connection is removed after the loop and never prevents
    /// delivery to the others.
    ///
    /// [`poll_all`]: Self::poll_all
    pub fn broadcast(&mut self, message: &Message) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        if self.connections.is_empty() {
            return report;
        }
        if message.contains_terminator() {
            warn!("broadcasting a message that contains 0x00; clients will see it split");
        }

        let frame = encode_frame(message);
        let mut failed = Vec::new();
        for (id, conn) in self.connections.iter_mut() {
            match conn.send_frame(&frame) {
                Ok(()) => report.delivered += 1,
                Err(e) => failed.push((*id, e)),
            }
        }

        report.failed = self.remove_failed(failed);
        report
    }

    /// Total output bytes queued across all connections.
    pub fn pending_output(&self) -> usize {
        self.connections.values().map(Connection::pending_output).sum()
    }

    /// Removes the given connections and logs why.  Returns how many were removed.
    fn remove_failed(&mut self, failed: Vec<(ConnectionId, ConnectionError)>) -> usize {
        let mut removed = 0;
        for (id, error) in failed {
            if let Some(conn) = self.connections.remove(&id) {
                removed += 1;
                match error {
                    ConnectionError::Closed => info!(
                        "client {id} ({}) disconnected; now {} connected",
                        conn.peer_addr(),
                        self.connections.len()
                    ),
                    other => warn!(
                        "client {id} ({}) dropped: {other}; now {} connected",
                        conn.peer_addr(),
                        self.connections.len()
                    ),
                }
            }
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
