//! Fuzz target for Timeline operations
//!
//! Applies arbitrary live appends, page responses, confirmations and
//! failures in any order.
//!
//! # Invariants
//!
//! - No message id appears twice
//! - At most one page request is in flight
//! - Temporary ids are never used as the pagination cursor

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use brightears_core::{
    DeliveryStatus, Message, MessageDraft, MessageId, Page, Sender, SenderRole, Timeline,
};
use chrono::DateTime;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Live(u8),
    Optimistic(u8),
    Confirm { temp: u8, server: u8 },
    Fail(u8),
    Retry(u8),
    Status { id: u8, read: bool },
    BeginInitial,
    BeginMore,
    Page { ids: Vec<u8>, has_more: bool, stale: bool },
    PageError,
    Cancel,
}

fn message(id: MessageId, n: u8) -> Message {
    let sender = Sender { id: "art-1".into(), name: "DJ".into(), role: SenderRole::Artist, avatar: None };
    let at = DateTime::from_timestamp(1_700_000_000 + i64::from(n), 0).unwrap_or_default();
    let mut message = Message::optimistic(id, &MessageDraft::text("x"), &sender, at);
    message.is_own = false;
    message
}

fn server_id(n: u8) -> MessageId {
    MessageId::new(format!("srv-{n}"))
}

fn temp_id(n: u8) -> MessageId {
    MessageId::temporary(u64::from(n))
}

fuzz_target!(|ops: Vec<Op>| {
    let mut timeline = Timeline::new();

    for op in ops {
        match op {
            Op::Live(n) => {
                timeline.add_message(message(server_id(n), n));
            },
            Op::Optimistic(n) => {
                let mut own = message(temp_id(n), n);
                own.is_own = true;
                timeline.add_message(own);
            },
            Op::Confirm { temp, server } => {
                if timeline.contains(&temp_id(temp)) {
                    timeline.confirm(&temp_id(temp), message(server_id(server), server));
                }
            },
            Op::Fail(n) => {
                let _ = timeline.mark_failed(&temp_id(n));
            },
            Op::Retry(n) => {
                let _ = timeline.retry_failed(&temp_id(n));
            },
            Op::Status { id, read } => {
                let status = if read { DeliveryStatus::Read } else { DeliveryStatus::Delivered };
                timeline.apply_status(&server_id(id), status, None);
            },
            Op::BeginInitial => {
                let _ = timeline.begin_initial(20);
            },
            Op::BeginMore => {
                let _ = timeline.begin_load_more(20);
            },
            Op::Page { ids, has_more, stale } => {
                let Some(request) = timeline.in_flight().cloned() else {
                    continue;
                };
                let request_id = if stale { request.id.wrapping_add(1) } else { request.id };
                let messages = ids.into_iter().map(|n| message(server_id(n), n)).collect();
                let _ = timeline.complete_page(request_id, Page { messages, has_more });
            },
            Op::PageError => {
                if let Some(request) = timeline.in_flight().cloned() {
                    timeline.fail_page(request.id, "fuzz");
                }
            },
            Op::Cancel => timeline.cancel_in_flight(),
        }

        let mut seen = HashSet::new();
        for message in timeline.messages() {
            assert!(seen.insert(message.id.clone()), "duplicate id {}", message.id);
        }
        if let Some(cursor) = timeline.cursor() {
            assert!(!cursor.is_temporary(), "temporary cursor {cursor}");
        }
    }
});
