//! Application layer for station-bridge.
//!
//! The application layer decides *what* happens to every message; the
//! infrastructure layer decides *how* bytes reach a socket.
//!
//! # Responsibilities
//!
//! - Running the relay iteration: accept, poll, publish, broadcast
//! - Idle back-off and the graceful stop flag
//! - Relay statistics
//!
//! # What does NOT belong here?
//!
//! - Socket options, framing or ZeroMQ details (infrastructure)
//! - Configuration parsing (domain and infrastructure)

pub mod relay_loop;

pub use relay_loop::{IterationReport, OutboundSender, RelayClosed, RelayLoop, RelayStats};
