//! # station-core
//!
//! Shared library for the Central Station bridge containing the wire framing
//! used by TCP trading clients and the opaque [`Message`] type that flows
//! between those clients and the message bus.
//!
//! This crate has zero dependencies on sockets, async runtimes, or the bus.
//!
//! # Architecture overview (for beginners)
//!
//! Trading terminals connect to the bridge over plain TCP and speak a very
//! small protocol: every message is an arbitrary byte string followed by a
//! single `0x00` terminator byte.  There is no length prefix, no checksum and
//! no handshake.
//!
//! TCP is a byte *stream*, so one `read()` may return half a message, or three
//! messages at once.  The [`FrameDecoder`] accumulates bytes across reads and
//! emits only complete messages.  [`encode_frame`] does the opposite and
//! appends the terminator before a message is written to a socket.
//!
//! The bridge never looks inside a message: ticks, orders and account
//! snapshots are all just bytes here.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `station_core::Message` instead of `station_core::protocol::message::Message`.
pub use protocol::frame::{encode_frame, encode_frame_into, FrameDecoder, FrameError, TERMINATOR};
pub use protocol::message::Message;
