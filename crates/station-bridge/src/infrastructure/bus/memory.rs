//! In-process bus for tests and for embedding the relay without ZeroMQ.
//!
//! [`MemoryBus::new`] returns the bus (handed to the relay loop) and a
//! [`MemoryBusPeer`] that plays the rest of the bus: it injects messages as
//! if they had arrived on the subscribe channel and observes everything the
//! relay publishes.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use station_core::Message;
use tokio::sync::mpsc;

use super::{Bus, BusError};

/// The relay-side half of an in-memory bus.
pub struct MemoryBus {
    inbound: mpsc::UnboundedReceiver<Message>,
    published: mpsc::UnboundedSender<Message>,
    failing: Arc<AtomicBool>,
}

/// The test-side half of an in-memory bus.
pub struct MemoryBusPeer {
    inject: mpsc::UnboundedSender<Message>,
    published: mpsc::UnboundedReceiver<Message>,
    failing: Arc<AtomicBool>,
}

impl MemoryBus {
    /// Creates a connected bus/peer pair.
    pub fn new() -> (MemoryBus, MemoryBusPeer) {
        let (inject, inbound) = mpsc::unbounded_channel();
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        let failing = Arc::new(AtomicBool::new(false));
        (
            MemoryBus {
                inbound,
                published: published_tx,
                failing: Arc::clone(&failing),
            },
            MemoryBusPeer {
                inject,
                published: published_rx,
                failing,
            },
        )
    }
}

impl MemoryBusPeer {
    /// Delivers `message` as if it had been received on the subscribe channel.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the [`MemoryBus`] half has been dropped.
    pub fn inject(&self, message: impl Into<Message>) -> Result<(), BusError> {
        self.inject
            .send(message.into())
            .map_err(|_| BusError::Closed)
    }

    /// Returns the next published message without waiting.
    pub fn try_published(&mut self) -> Option<Message> {
        self.published.try_recv().ok()
    }

    /// Waits for the next published message.  `None` once the bus is dropped.
    pub async fn next_published(&mut self) -> Option<Message> {
        self.published.recv().await
    }

    /// Takes every message published so far.
    pub fn drain_published(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(message) = self.published.try_recv() {
            out.push(message);
        }
        out
    }

    /// Makes every subsequent publish fail until switched back.
    pub fn set_publish_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Bus for MemoryBus {
    fn try_get(&mut self) -> Option<Message> {
        self.inbound.try_recv().ok()
    }

    async fn publish(&mut self, message: Message) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        self.published.send(message).map_err(|_| BusError::Closed)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_messages_are_returned_in_order() {
        // Arrange
        let (mut bus, peer) = MemoryBus::new();

        // Act
        peer.inject("m1").unwrap();
        peer.inject("m2").unwrap();

        // Assert
        assert_eq!(bus.try_get(), Some(Message::from("m1")));
        assert_eq!(bus.try_get(), Some(Message::from("m2")));
        assert_eq!(bus.try_get(), None);
    }

    #[tokio::test]
    async fn test_published_messages_reach_the_peer() {
        let (mut bus, mut peer) = MemoryBus::new();

        bus.publish(Message::from("tick EURUSD 1.1 1.2")).await.unwrap();

        assert_eq!(
            peer.next_published().await,
            Some(Message::from("tick EURUSD 1.1 1.2"))
        );
        assert_eq!(peer.try_published(), None);
    }

    #[tokio::test]
    async fn test_publish_fails_when_switched_to_failing() {
        let (mut bus, mut peer) = MemoryBus::new();
        peer.set_publish_failing(true);

        let result = bus.publish(Message::from("lost")).await;

        assert!(matches!(result, Err(BusError::Closed)));
        assert!(peer.drain_published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_fails_after_peer_is_dropped() {
        let (mut bus, peer) = MemoryBus::new();
        drop(peer);
        assert!(bus.publish(Message::from("x")).await.is_err());
    }

    #[test]
    fn test_inject_fails_after_bus_is_dropped() {
        let (bus, peer) = MemoryBus::new();
        drop(bus);

        let result = peer.inject("nobody listening");

        assert!(matches!(result, Err(BusError::Closed)));
    }
}
