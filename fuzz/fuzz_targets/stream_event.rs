//! Fuzz target for StreamEvent::decode
//!
//! # Invariants
//!
//! - Arbitrary payloads never panic; invalid ones return `ChatError::Decode`
//! - A payload that decodes re-encodes to JSON that decodes to the same event

#![no_main]

use brightears_core::StreamEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(event) = StreamEvent::decode(payload) else {
        return;
    };

    let encoded = serde_json::to_string(&event).expect("decoded events re-encode");
    let again = StreamEvent::decode(&encoded).expect("re-encoded events decode");
    assert_eq!(event, again);
});
