//! Infrastructure layer for station-bridge.
//!
//! Everything that owns a socket or touches the filesystem lives here:
//!
//! - [`connection`]: one accepted trading-terminal socket and its frame decoder
//! - [`registry`]: the TCP listener and the live connection set
//! - [`bus`]: the [`bus::Bus`] trait, ZeroMQ implementation and in-memory bus
//! - [`config_file`]: optional TOML configuration

pub mod bus;
pub mod config_file;
pub mod connection;
pub mod registry;

pub use bus::{Bus, BusError, MemoryBus, MemoryBusPeer, ZmqBus};
pub use connection::{Connection, ConnectionError, ConnectionId, ConnectionSettings};
pub use registry::{BroadcastReport, ConnectionRegistry, PollOutcome, RegistryError};
