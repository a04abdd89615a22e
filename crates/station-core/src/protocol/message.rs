//! The opaque message type carried between TCP clients and the bus.

use std::fmt;

use crate::protocol::frame::TERMINATOR;

/// An opaque, immutable byte string.
///
/// The bridge never interprets message contents.  A message may be empty and
/// may hold text or binary data; the only constraint is that it must not
/// contain the frame terminator (`0x00`), because the TCP framing has no
/// escaping.  Messages produced by [`crate::FrameDecoder`] satisfy this by
/// construction.  Messages arriving from the bus are not checked here; see
/// [`Message::contains_terminator`].
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Message(Vec<u8>);

impl Message {
    /// Wraps raw bytes as a message.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the message payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the message and returns its payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the payload contains the frame terminator.
    ///
    /// Such a message would be split into several frames by the receiving
    /// client.  Encoding it is still allowed.
    pub fn contains_terminator(&self) -> bool {
        self.0.contains(&TERMINATOR)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Message {
    // Most traffic is ASCII text, so print it readably in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", String::from_utf8_lossy(&self.0))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_from_str_keeps_bytes() {
        let msg = Message::from("tick EURUSD 1.1 1.2");
        assert_eq!(msg.as_bytes(), b"tick EURUSD 1.1 1.2");
        assert_eq!(msg.len(), 19);
    }

    #[test]
    fn test_empty_message_is_allowed() {
        let msg = Message::default();
        assert!(msg.is_empty());
        assert!(!msg.contains_terminator());
    }

    #[test]
    fn test_contains_terminator_detects_embedded_nul() {
        let msg = Message::new(vec![b'a', 0x00, b'b']);
        assert!(msg.contains_terminator());
    }

    #[test]
    fn test_binary_payload_is_preserved() {
        let bytes = vec![0xFF, 0x01, 0x7F, 0x80];
        let msg = Message::from(bytes.clone());
        assert_eq!(msg.into_bytes(), bytes);
    }

    #[test]
    fn test_debug_output_is_readable_text() {
        let msg = Message::from("orders A []");
        assert_eq!(format!("{msg:?}"), "Message(\"orders A []\")");
    }
}
