//! Null-terminated frame codec.
//!
//! Wire format:
//! ```text
//! [payload:N][0x00] [payload:M][0x00] ...
//! ```
//! No length prefix, no checksum, no escaping.  A frame ends at the first
//! `0x00` byte, so payloads must not contain it.
//!
//! # Streaming decode
//!
//! TCP is a *stream* protocol: a single `read()` call may return less than one
//! complete frame, or more than one.  [`FrameDecoder`] keeps the bytes that
//! have not yet been terminated and remembers how far it already scanned, so
//! each byte is inspected for a terminator exactly once no matter how the
//! stream is chunked.

use thiserror::Error;
use tracing::trace;

use crate::protocol::message::Message;

/// The byte that terminates every frame on the wire.
pub const TERMINATOR: u8 = 0x00;

/// Default upper bound on the size of a single unterminated frame (16 MiB).
///
/// The wire format itself has no limit; the cap only bounds the memory one
/// client can pin with a frame it never terminates.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors that can occur while decoding a frame stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The peer sent more than `max` bytes without a terminator.
    ///
    /// The accumulation buffer is discarded when this is reported; the stream
    /// cannot be resynchronised reliably, so callers should drop the peer.
    #[error("unterminated frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLong { len: usize, max: usize },
}

/// Incremental decoder for the null-terminated framing.
///
/// # Examples
///
/// ```rust
/// use station_core::{FrameDecoder, Message};
///
/// let mut decoder = FrameDecoder::new();
/// let first = decoder.feed(b"a\0b").unwrap();
/// assert_eq!(first, vec![Message::from("a")]);
///
/// let second = decoder.feed(b"c\0").unwrap();
/// assert_eq!(second, vec![Message::from("bc")]);
/// assert!(decoder.residue().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    /// Bytes received but not yet terminated.
    buf: Vec<u8>,
    /// Offset into `buf` up to which no terminator exists.
    scanned: usize,
    max_frame_len: usize,
}

impl FrameDecoder {
    /// Creates a decoder with the [`DEFAULT_MAX_FRAME_LEN`] limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates a decoder that rejects unterminated frames longer than `max_frame_len`.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_frame_len,
        }
    }

    /// Appends `chunk` and returns every frame it completed, in stream order.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::FrameTooLong`] if the unterminated residue grows
    /// past the configured limit.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Message>, FrameError> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out)?;
        Ok(out)
    }

    /// Like [`feed`](Self::feed) but appends completed frames to `out`.
    ///
    /// Frames completed before an error is detected are still pushed to `out`.
    /// Returns the number of frames appended.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::FrameTooLong`] if the unterminated residue grows
    /// past the configured limit.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<Message>) -> Result<usize, FrameError> {
        self.buf.extend_from_slice(chunk);

        let mut emitted = 0;
        let mut frame_start = 0;
        let mut search_from = self.scanned;

        while let Some(pos) = self.buf[search_from..].iter().position(|&b| b == TERMINATOR) {
            let frame_end = search_from + pos;
            out.push(Message::from(&self.buf[frame_start..frame_end]));
            emitted += 1;
            frame_start = frame_end + 1;
            search_from = frame_start;
        }

        // Drop everything up to and including the last terminator.
        self.buf.drain(..frame_start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_frame_len {
            let len = self.buf.len();
            self.clear();
            return Err(FrameError::FrameTooLong {
                len,
                max: self.max_frame_len,
            });
        }

        if emitted > 0 {
            trace!(frames = emitted, residue = self.buf.len(), "decoded frames");
        }
        Ok(emitted)
    }

    /// Returns the bytes received since the last terminator.
    pub fn residue(&self) -> &[u8] {
        &self.buf
    }

    /// Discards any partially received frame.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes `message` as a single frame (payload followed by the terminator).
///
/// The payload is not escaped.  Encoding a message that contains `0x00` is a
/// caller error that produces more than one frame on the receiving side.
///
/// ```rust
/// use station_core::{encode_frame, Message};
///
/// assert_eq!(encode_frame(&Message::from("bc")), b"bc\0".to_vec());
/// ```
pub fn encode_frame(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(message.len() + 1);
    encode_frame_into(message, &mut buf);
    buf
}

/// Appends the encoded frame for `message` to `buf`.
pub fn encode_frame_into(message: &Message, buf: &mut Vec<u8>) {
    buf.reserve(message.len() + 1);
    buf.extend_from_slice(message.as_bytes());
    buf.push(TERMINATOR);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
