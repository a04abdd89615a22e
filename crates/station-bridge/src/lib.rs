//! station-bridge library crate.
//!
//! This crate bridges TCP-connected trading terminals to a ZeroMQ PUB/SUB
//! bus.  Every null-terminated message a terminal sends is published on the
//! bus; every message received from the bus is broadcast to all terminals.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Trading terminals (0x00-terminated frames over TCP)
//!         ↕
//! [station-bridge]
//!   ├── domain/           BridgeConfig, ErrorIsolation
//!   ├── application/      RelayLoop: couples the registry and the bus
//!   └── infrastructure/
//!         ├── connection/ One accepted TCP socket + its frame decoder
//!         ├── registry/   Listener + live connection set
//!         ├── bus/        Bus trait, ZeroMQ implementation, in-memory double
//!         └── config_file/ TOML configuration loading
//!         ↕
//! ZeroMQ bus (PUB endpoint the bridge publishes on, SUB endpoint it reads)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and on the `Bus` trait, not on ZeroMQ.
//! - `infrastructure` owns every socket.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: the relay loop.
pub mod application;

/// Infrastructure layer: TCP connections, bus sockets, config files.
pub mod infrastructure;
