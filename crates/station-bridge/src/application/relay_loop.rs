//! RelayLoop: the control component coupling the TCP side and the bus.
//!
//! One iteration:
//!
//! 1. accept every pending client connection
//! 2. if clients are connected, poll them once and collect complete messages
//! 3. publish each collected message on the bus
//! 4. drain the bus receive queue, broadcasting each message to all clients
//!    (and republishing it when configured)
//! 5. drain the in-process outbound queue, broadcasting each message
//!
//! When an iteration did nothing at all the loop sleeps for the configured
//! idle interval; otherwise it starts the next iteration immediately.
//!
//! # Architecture
//!
//! The loop is generic over [`Bus`], so it runs unchanged against ZeroMQ in
//! production and against [`MemoryBus`](crate::infrastructure::MemoryBus) or a
//! mock in tests.  The connection registry is owned here and never shared.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use station_core::Message;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::BridgeConfig;
use crate::infrastructure::{Bus, ConnectionRegistry};

/// Returned by [`OutboundSender::send`] once the relay loop is gone.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("relay loop has shut down")]
pub struct RelayClosed;

/// Cloneable handle for enqueueing messages to broadcast to every client.
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl OutboundSender {
    /// Queues `message` for broadcast on the next iteration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayClosed`] if the relay loop has been dropped.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), RelayClosed> {
        self.tx.send(message.into()).map_err(|_| RelayClosed)
    }
}

/// What a single iteration did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IterationReport {
    pub accepted: usize,
    pub disconnected: usize,
    pub from_tcp: usize,
    pub from_bus: usize,
    pub outbound: usize,
    pub publish_failures: usize,
}

impl IterationReport {
    /// True when the iteration saw no connection event and moved no message.
    pub fn is_idle(&self) -> bool {
        self.accepted == 0
            && self.disconnected == 0
            && self.from_tcp == 0
            && self.from_bus == 0
            && self.outbound == 0
    }
}

/// Running totals since the loop was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub accepted: u64,
    pub dropped: u64,
    pub from_tcp: u64,
    pub from_bus: u64,
    pub outbound: u64,
    pub publish_failures: u64,
    pub iterations: u64,
    pub idle_iterations: u64,
}

impl RelayStats {
    fn record(&mut self, report: &IterationReport) {
        self.accepted += report.accepted as u64;
        self.dropped += report.disconnected as u64;
        self.from_tcp += report.from_tcp as u64;
        self.from_bus += report.from_bus as u64;
        self.outbound += report.outbound as u64;
        self.publish_failures += report.publish_failures as u64;
        self.iterations += 1;
        if report.is_idle() {
            self.idle_iterations += 1;
        }
    }
}

impl fmt::Display for RelayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} dropped={} from_tcp={} from_bus={} outbound={} \
             publish_failures={} iterations={} idle={}",
            self.accepted,
            self.dropped,
            self.from_tcp,
            self.from_bus,
            self.outbound,
            self.publish_failures,
            self.iterations,
            self.idle_iterations
        )
    }
}

/// Couples a [`ConnectionRegistry`] with a [`Bus`].
pub struct RelayLoop<B: Bus> {
    registry: ConnectionRegistry,
    bus: B,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: mpsc::UnboundedReceiver<Message>,
    idle_sleep: Duration,
    republish: bool,
    stats: RelayStats,
}

impl<B: Bus> RelayLoop<B> {
    pub fn new(registry: ConnectionRegistry, bus: B, config: &BridgeConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            bus,
            outbound_tx,
            outbound_rx,
            idle_sleep: config.idle_sleep,
            republish: config.republish_bus_messages,
            stats: RelayStats::default(),
        }
    }

    /// A handle other in-process producers can use to broadcast to clients.
    pub fn outbound_sender(&self) -> OutboundSender {
        OutboundSender {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.registry.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Output bytes queued for clients that have not taken them yet.
    pub fn pending_output(&self) -> usize {
        self.registry.pending_output()
    }

    /// Runs one iteration and reports what it did.  Never sleeps.
    pub async fn run_once(&mut self) -> IterationReport {
        let mut report = IterationReport {
            accepted: self.registry.accept_pending(),
            ..IterationReport::default()
        };

        if self.registry.has_connections() {
            let outcome = self.registry.poll_all().await;
            report.disconnected += outcome.disconnected;
            report.from_tcp = outcome.messages.len();
            for message in outcome.messages {
                self.publish(message, &mut report).await;
            }
        }

        while let Some(message) = self.bus.try_get() {
            report.from_bus += 1;
            let delivery = self.registry.broadcast(&message);
            report.disconnected += delivery.failed;
            if self.republish {
                self.publish(message, &mut report).await;
            }
        }

        while let Ok(message) = self.outbound_rx.try_recv() {
            report.outbound += 1;
            let delivery = self.registry.broadcast(&message);
            report.disconnected += delivery.failed;
        }

        self.stats.record(&report);
        report
    }

    /// Iterates until `running` is cleared, then returns the final totals.
    ///
    /// The flag is checked between iterations; an iteration in progress
    /// always completes.
    pub async fn run(&mut self, running: Arc<AtomicBool>) -> RelayStats {
        info!(
            "relay loop started on {} (republish bus messages: {})",
            self.registry.local_addr(),
            self.republish
        );

        while running.load(Ordering::Relaxed) {
            let report = self.run_once().await;
            if report.is_idle() && self.registry.pending_output() == 0 {
                tokio::time::sleep(self.idle_sleep).await;
            } else {
                // Busy iterations still give the receiver task a turn.
                tokio::task::yield_now().await;
            }
        }

        info!("relay loop stopped: {}", self.stats);
        self.stats
    }

    async fn publish(&mut self, message: Message, report: &mut IterationReport) {
        let len = message.len();
        match self.bus.publish(message).await {
            Ok(()) => debug!(bytes = len, "published to bus"),
            Err(e) => {
                report.publish_failures += 1;
                warn!("dropping message of {len} bytes: {e}");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
