//! Message bus abstraction.
//!
//! The relay loop talks to the bus only through the [`Bus`] trait:
//!
//! - [`zmq::ZmqBus`] is the production implementation (ZeroMQ PUB/SUB).
//! - [`memory::MemoryBus`] is an in-process double for tests and embedding.
//!
//! Receipt is decoupled from the loop: implementations fill an internal
//! queue from a background task and [`Bus::try_get`] only pops from it.

pub mod memory;
pub mod zmq;

use std::time::Duration;

use async_trait::async_trait;
use station_core::Message;
use thiserror::Error;

pub use memory::{MemoryBus, MemoryBusPeer};
pub use zmq::ZmqBus;

/// Errors from bus setup and publishing.
#[derive(Debug, Error)]
pub enum BusError {
    /// A bus socket could not be bound to its endpoint.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: ::zeromq::ZmqError,
    },

    /// The subscribe socket rejected the catch-all subscription.
    #[error("failed to subscribe: {0}")]
    Subscribe(#[source] ::zeromq::ZmqError),

    /// The publish socket reported an error for one message.
    #[error("publish failed: {0}")]
    Send(#[source] ::zeromq::ZmqError),

    /// The publish socket did not take the message in time.
    #[error("publish timed out after {0:?}")]
    SendTimeout(Duration),

    /// The bus was shut down.
    #[error("bus is closed")]
    Closed,
}

/// The publish/subscribe side of the bridge.
///
/// Both methods are called from the relay loop only, so implementations need
/// `&mut self` but no internal locking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Bus: Send {
    /// Pops the next message received from the subscribe channel, if any.
    ///
    /// Never waits.
    fn try_get(&mut self) -> Option<Message>;

    /// Publishes one message on the publish channel.
    ///
    /// Best effort: the caller logs a failure and carries on.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] when the message could not be handed to the bus.
    async fn publish(&mut self, message: Message) -> Result<(), BusError>;
}
