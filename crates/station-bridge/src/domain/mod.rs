//! Domain layer for station-bridge.
//!
//! Pure types with no dependencies on sockets, files, or the async runtime.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures and their validation rules
//! - Policy enums such as [`ErrorIsolation`]
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or ZeroMQ types
//! - File I/O or environment variable reading

pub mod config;

pub use config::{BridgeConfig, ConfigError, ErrorIsolation};
