//! Property-based tests for the event-stream decoder.
//!
//! The network may split the byte stream anywhere. Decoding must not care.

#![allow(clippy::unwrap_used)]

use brightears_core::{SseDecoder, StreamEvent};
use proptest::prelude::*;

fn encode(payloads: &[String], line_ending: &str) -> Vec<u8> {
    let mut out = String::new();
    for (i, payload) in payloads.iter().enumerate() {
        if i % 3 == 0 {
            out.push_str(": heartbeat");
            out.push_str(line_ending);
        }
        out.push_str("data: ");
        out.push_str(payload);
        out.push_str(line_ending);
        out.push_str(line_ending);
    }
    out.into_bytes()
}

fn decode_in_chunks(bytes: &[u8], cuts: &[usize]) -> Vec<String> {
    let mut decoder = SseDecoder::new();
    let mut frames = Vec::new();
    let mut start = 0;

    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.push(bytes.len());

    for cut in cuts {
        if cut < start {
            continue;
        }
        frames.extend(decoder.feed(&bytes[start..cut]).unwrap());
        start = cut;
    }

    frames.into_iter().map(|frame| frame.data).collect()
}

proptest! {
    #[test]
    fn prop_chunking_does_not_change_frames(
        payloads in prop::collection::vec("[a-zA-Z0-9{}\":, ]{1,40}", 1..10),
        cuts in prop::collection::vec(any::<usize>(), 0..20),
        crlf in any::<bool>(),
    ) {
        let ending = if crlf { "\r\n" } else { "\n" };
        let bytes = encode(&payloads, ending);

        let whole = decode_in_chunks(&bytes, &[]);
        let split = decode_in_chunks(&bytes, &cuts);

        prop_assert_eq!(&whole, &split);
        prop_assert_eq!(&whole, &payloads);
    }

    #[test]
    fn prop_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut decoder = SseDecoder::new();
        let _ = decoder.feed(&bytes);
    }
}

#[test]
fn decodes_typed_events_from_stream() {
    let mut decoder = SseDecoder::new();
    let frames = decoder
        .feed(
            b"data: {\"type\":\"ping\",\"timestamp\":\"2024-11-02T10:00:00Z\"}\n\n\
              data: {\"type\":\"typing\",\"data\":{\"userId\":\"u1\",\"userName\":\"Mint\",\"isTyping\":false}}\n\n",
        )
        .unwrap();

    let kinds: Vec<_> =
        frames.iter().map(|f| StreamEvent::decode(&f.data).map(|e| e.kind()).unwrap()).collect();
    assert_eq!(kinds, vec!["ping", "typing"]);
}
