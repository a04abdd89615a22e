//! Integration tests for the station-core frame codec.
//!
//! These tests exercise [`FrameDecoder`] and [`encode_frame`] through the
//! public API and check the streaming properties a TCP reader depends on:
//!
//! - Encoding a list of messages and decoding the byte stream yields the same
//!   list no matter where the stream is cut into read chunks.
//! - A terminator arriving in a later chunk than its payload completes the
//!   frame exactly as if both had arrived together.
//! - Several frames in one chunk are all emitted, in order.
//!
//! The `proptest!` block at the end checks the same properties over arbitrary
//! payloads and arbitrary cut points.

use proptest::prelude::*;
use station_core::{encode_frame, FrameDecoder, Message};

/// Encodes every message back to back into one contiguous stream.
fn encode_stream(messages: &[Message]) -> Vec<u8> {
    messages.iter().flat_map(encode_frame).collect()
}

/// Feeds `stream` to a fresh decoder in chunks of `chunk_len` bytes.
fn decode_in_chunks(stream: &[u8], chunk_len: usize) -> (Vec<Message>, usize) {
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();
    for chunk in stream.chunks(chunk_len) {
        decoder
            .feed_into(chunk, &mut out)
            .expect("no frame in these fixtures exceeds the limit");
    }
    (out, decoder.residue().len())
}

/// Feeds `stream` split at the given cut points, which must be sorted.
fn decode_with_cuts(stream: &[u8], cuts: &[usize]) -> Vec<Message> {
    let mut decoder = FrameDecoder::new();
    let mut out = Vec::new();
    let mut start = 0;
    let end = stream.len();
    for &cut in cuts.iter().chain(std::iter::once(&end)) {
        decoder.feed_into(&stream[start..cut], &mut out).unwrap();
        start = cut;
    }
    out
}

fn sample_messages() -> Vec<Message> {
    vec![
        Message::from("tick EURUSD 1.1 1.2"),
        Message::default(),
        Message::from("orders A []"),
        Message::new(vec![0x01, 0xFF, 0x7F]),
        Message::from("x"),
        Message::from("account 1000.00 EUR"),
    ]
}

#[test]
fn test_roundtrip_for_every_fixed_chunk_size() {
    let messages = sample_messages();
    let stream = encode_stream(&messages);

    for chunk_len in 1..=stream.len() {
        let (decoded, residue) = decode_in_chunks(&stream, chunk_len);
        assert_eq!(decoded, messages, "chunk length {chunk_len}");
        assert_eq!(residue, 0, "chunk length {chunk_len}");
    }
}

#[test]
fn test_roundtrip_for_every_two_way_split() {
    let messages = sample_messages();
    let stream = encode_stream(&messages);

    for cut in 0..=stream.len() {
        assert_eq!(decode_with_cuts(&stream, &[cut]), messages, "cut at {cut}");
    }
}

#[test]
fn test_split_terminator_matches_single_chunk() {
    let mut together = FrameDecoder::new();
    let expected = together.feed(b"tick EURUSD 1.1 1.2\0").unwrap();

    let mut split = FrameDecoder::new();
    let mut actual = split.feed(b"tick EURUSD 1.1 1.2").unwrap();
    assert!(actual.is_empty(), "no frame may be emitted before the terminator");
    actual.extend(split.feed(b"\0").unwrap());

    assert_eq!(actual, expected);
}

#[test]
fn test_terminator_then_payload_in_later_chunk() {
    // The terminator closes the first frame; the rest starts the next one.
    let mut decoder = FrameDecoder::new();
    let first = decoder.feed(b"a\0").unwrap();
    let second = decoder.feed(b"bc\0").unwrap();

    let mut one_shot = FrameDecoder::new();
    let all = one_shot.feed(b"a\0bc\0").unwrap();

    assert_eq!([first, second].concat(), all);
}

#[test]
fn test_multi_frame_read_yields_a_then_bc() {
    let mut decoder = FrameDecoder::new();

    let out = decoder.feed(b"a\0bc\0").unwrap();

    assert_eq!(out, vec![Message::from("a"), Message::from("bc")]);
    assert!(decoder.residue().is_empty());
}

#[test]
fn test_single_connection_order_is_preserved() {
    let stream = b"m1\0m2\0m3\0";
    let expected = vec![Message::from("m1"), Message::from("m2"), Message::from("m3")];

    for cut_a in 0..=stream.len() {
        for cut_b in cut_a..=stream.len() {
            assert_eq!(
                decode_with_cuts(stream, &[cut_a, cut_b]),
                expected,
                "cuts at {cut_a} and {cut_b}"
            );
        }
    }
}

// ── Arbitrary payloads and chunkings ─────────────────────────────────────────

/// Payloads without the terminator byte, empty ones included.
fn payloads() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec(prop::collection::vec(1u8..=255, 0..64), 0..16)
        .prop_map(|raw| raw.into_iter().map(Message::new).collect())
}

/// Maps arbitrary numbers onto sorted cut points inside a stream of `len` bytes.
fn cut_points(raw: &[usize], len: usize) -> Vec<usize> {
    let mut cuts: Vec<usize> = raw.iter().map(|r| r % (len + 1)).collect();
    cuts.sort_unstable();
    cuts
}

proptest! {
    #[test]
    fn roundtrip_survives_any_chunking(
        messages in payloads(),
        raw_cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let stream = encode_stream(&messages);
        let cuts = cut_points(&raw_cuts, stream.len());

        prop_assert_eq!(decode_with_cuts(&stream, &cuts), messages);
    }

    #[test]
    fn terminator_alone_in_its_own_chunk_completes_the_frame(
        payload in prop::collection::vec(1u8..=255, 0..256),
    ) {
        let mut decoder = FrameDecoder::new();

        let before = decoder.feed(&payload).unwrap();
        prop_assert!(before.is_empty());
        prop_assert_eq!(decoder.residue().len(), payload.len());

        let after = decoder.feed(&[0]).unwrap();
        prop_assert_eq!(after, vec![Message::new(payload)]);
        prop_assert!(decoder.residue().is_empty());
    }

    #[test]
    fn fixed_chunk_size_never_reorders_or_loses_frames(
        messages in payloads(),
        chunk_len in 1usize..32,
    ) {
        let stream = encode_stream(&messages);

        let (decoded, residue) = decode_in_chunks(&stream, chunk_len);

        prop_assert_eq!(decoded, messages);
        prop_assert_eq!(residue, 0);
    }

    #[test]
    fn unterminated_tail_stays_in_the_residue(
        messages in payloads(),
        tail in prop::collection::vec(1u8..=255, 1..64),
    ) {
        let mut stream = encode_stream(&messages);
        stream.extend_from_slice(&tail);

        let (decoded, residue) = decode_in_chunks(&stream, 7);

        prop_assert_eq!(decoded, messages);
        prop_assert_eq!(residue, tail.len());
    }
}
