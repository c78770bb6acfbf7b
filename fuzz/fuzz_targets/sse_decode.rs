//! Fuzz target for SseDecoder::feed
//!
//! Feeds arbitrary bytes twice: once whole, once split at arbitrary points.
//!
//! # Invariants
//!
//! - Decoding never panics
//! - When neither run reports an error, both produce the same frames
//!   (output is independent of chunking)

#![no_main]

use arbitrary::Arbitrary;
use brightears_core::{SseDecoder, SseFrame};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    bytes: Vec<u8>,
    splits: Vec<u16>,
}

fn decode(chunks: &[&[u8]]) -> Option<Vec<SseFrame>> {
    let mut decoder = SseDecoder::new();
    let mut frames = Vec::new();
    for chunk in chunks {
        frames.extend(decoder.feed(chunk).ok()?);
    }
    Some(frames)
}

fuzz_target!(|input: Input| {
    let whole = decode(&[&input.bytes]);

    let mut cuts: Vec<usize> =
        input.splits.iter().map(|&s| usize::from(s) % (input.bytes.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(&input.bytes[start..cut]);
        start = cut;
    }
    chunks.push(&input.bytes[start..]);

    if let (Some(whole), Some(split)) = (whole, decode(&chunks)) {
        assert_eq!(whole, split, "frames depend on chunk boundaries");
    }
});
