//! Runtime tests against the scripted server.
//!
//! Every test runs on tokio's paused clock: when all tasks are idle the
//! clock jumps to the next timer, so backoff and heartbeat deadlines elapse
//! instantly while keeping their exact virtual durations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use brightears_app::{ChatHandle, Runtime, RuntimeError, SystemEnv};
use brightears_client::{ChatConfig, ChatSnapshot, ConnectionStatus, ConversationId};
use brightears_core::{
    ConnectedData, DeliveryStatus, Message, MessageDraft, MessageId, Sender, SenderRole,
    StreamEvent, TypingData,
};
use brightears_harness::{Call, ScriptedTransport};
use chrono::{DateTime, TimeDelta};
use tokio::{task::JoinHandle, time::Instant};

fn viewer() -> Sender {
    Sender { id: "cust-1".into(), name: "Nok".into(), role: SenderRole::Customer, avatar: None }
}

fn artist() -> Sender {
    Sender { id: "art-1".into(), name: "DJ Ploy".into(), role: SenderRole::Artist, avatar: None }
}

/// `count` artist messages, oldest first.
fn history(count: usize) -> Vec<Message> {
    let base = DateTime::from_timestamp(1_699_000_000, 0).unwrap();
    (0..count)
        .map(|n| {
            let mut message = Message::optimistic(
                MessageId::new(format!("old-{n:03}")),
                &MessageDraft::text(format!("message {n}")),
                &artist(),
                base + TimeDelta::seconds(n as i64),
            );
            message.is_own = false;
            message
        })
        .collect()
}

fn spawn(
    transport: &ScriptedTransport,
    config: ChatConfig,
) -> (ChatHandle, JoinHandle<Result<(), RuntimeError>>) {
    let (runtime, handle) = Runtime::new(
        SystemEnv::new(),
        transport.clone(),
        ConversationId::from("bk-42"),
        viewer(),
        config,
    );
    (handle, tokio::spawn(runtime.run()))
}

/// Wait for `predicate`, failing the test after a minute of virtual time.
async fn settle(
    handle: &mut ChatHandle,
    predicate: impl FnMut(&ChatSnapshot) -> bool,
) -> ChatSnapshot {
    tokio::time::timeout(Duration::from_secs(60), handle.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("runtime stopped")
}

async fn connected(handle: &mut ChatHandle) -> ChatSnapshot {
    settle(handle, |s| s.status == ConnectionStatus::Connected && !s.is_loading).await
}

#[tokio::test(start_paused = true)]
async fn connects_and_loads_newest_page() {
    let transport = ScriptedTransport::new(viewer());
    transport.seed_history(history(3));
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());

    let snapshot = connected(&mut handle).await;
    assert_eq!(snapshot.messages.len(), 3);
    assert!(!snapshot.has_more);
    assert_eq!(snapshot.reconnect_attempts, 0);

    let calls = transport.calls();
    assert!(calls.contains(&Call::OpenStream));
    assert!(calls.contains(&Call::FetchPage { limit: 50, before: None }));

    assert!(transport.push(StreamEvent::Connected {
        data: ConnectedData { connection_id: "c-1".into(), active_users: 2 },
        timestamp: None,
    }));
    let snapshot = settle(&mut handle, |s| s.active_users == 2).await;
    assert_eq!(snapshot.connection_id.as_deref(), Some("c-1"));
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_base_delay() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    let failed_at = Instant::now();
    transport.fail_stream("connection reset");

    let opens = transport.clone();
    let snapshot = settle(&mut handle, move |s| {
        s.status == ConnectionStatus::Connected && opens.open_count() == 2
    })
    .await;

    let waited = failed_at.elapsed();
    assert!(waited >= Duration::from_secs(1), "reopened after {waited:?}");
    assert!(waited < Duration::from_secs(2), "reopened after {waited:?}");
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn server_closing_the_stream_triggers_reconnect() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    transport.close_stream();

    let opens = transport.clone();
    settle(&mut handle, move |s| s.status == ConnectionStatus::Connected && opens.open_count() == 2)
        .await;
}

#[tokio::test(start_paused = true)]
async fn gives_up_then_reconnects_manually() {
    let transport = ScriptedTransport::new(viewer());
    let mut config = ChatConfig::default();
    config.reconnect.max_attempts = 2;
    let (mut handle, _task) = spawn(&transport, config);
    connected(&mut handle).await;

    transport.fail_next_opens(2, "503 Service Unavailable");
    transport.fail_stream("connection reset");

    let snapshot = settle(&mut handle, |s| s.needs_manual_reconnect).await;
    assert_eq!(snapshot.status, ConnectionStatus::Error);
    assert_eq!(snapshot.reconnect_attempts, 2);
    assert!(snapshot.last_error.is_some());
    assert_eq!(transport.open_count(), 3);

    // Nothing further happens on its own.
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(transport.open_count(), 3);

    handle.reconnect().await.unwrap();
    let snapshot = connected(&mut handle).await;
    assert!(!snapshot.needs_manual_reconnect);
    assert_eq!(transport.open_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn silent_stream_is_replaced() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    let opens = transport.clone();
    tokio::time::timeout(
        Duration::from_secs(120),
        handle.wait_for(move |s| s.status == ConnectionStatus::Connected && opens.open_count() == 2),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test(start_paused = true)]
async fn pings_keep_the_stream_alive() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(transport.push(StreamEvent::Ping { timestamp: None }));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(transport.open_count(), 1);
    assert_eq!(handle.snapshot().status, ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn send_confirms_in_place_and_ignores_echo() {
    let transport = ScriptedTransport::new(viewer());
    transport.echo_sends(true);
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    let temp_id = handle.send_message(MessageDraft::text("Is the 14th still free?")).await.unwrap();
    assert!(temp_id.is_temporary());
    assert_eq!(handle.snapshot().messages.len(), 1);

    settle(&mut handle, |s| s.messages.iter().all(|m| !m.id.is_temporary())).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].id, MessageId::new("srv-1"));
    assert!(snapshot.messages[0].is_own);
    assert!(snapshot.messages.iter().all(|m| m.id != temp_id));
}

#[tokio::test(start_paused = true)]
async fn failed_send_can_be_retried() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    transport.fail_next_send("503 Service Unavailable");
    let temp_id = handle.send_message(MessageDraft::text("Deposit sent")).await.unwrap();

    let snapshot = settle(&mut handle, |s| {
        s.messages.first().is_some_and(|m| m.status == DeliveryStatus::Failed)
    })
    .await;
    assert!(snapshot.last_error.is_some());
    let failed = snapshot.messages[0].id.clone();
    assert_eq!(failed, temp_id);

    handle.retry_message(failed).await.unwrap();
    let snapshot = settle(&mut handle, |s| s.messages.iter().all(|m| !m.id.is_temporary())).await;
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].status, DeliveryStatus::Sent);

    let posts = transport.calls().iter().filter(|c| matches!(c, Call::SendMessage(_))).count();
    assert_eq!(posts, 2);
}

#[tokio::test(start_paused = true)]
async fn retrying_a_sent_message_is_rejected() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    handle.send_message(MessageDraft::text("hello")).await.unwrap();
    let snapshot = settle(&mut handle, |s| s.messages.iter().all(|m| !m.id.is_temporary())).await;

    let result = handle.retry_message(snapshot.messages[0].id.clone()).await;
    assert!(matches!(result, Err(RuntimeError::Chat(_))));
}

#[tokio::test(start_paused = true)]
async fn typing_start_is_debounced_and_auto_stops() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    handle.input_changed("Wh").await.unwrap();
    handle.input_changed("What").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(transport.typing_signals().is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(transport.typing_signals(), vec![true]);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.typing_signals(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn remote_typing_indicator_expires() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    assert!(transport.push(StreamEvent::Typing {
        data: TypingData {
            user_id: "art-1".into(),
            user_name: "DJ Ploy".into(),
            is_typing: true,
        },
        timestamp: None,
    }));
    let snapshot = settle(&mut handle, |s| !s.typing_users.is_empty()).await;
    assert_eq!(snapshot.typing_users[0].user_name, "DJ Ploy");

    let snapshot = settle(&mut handle, |s| s.typing_users.is_empty()).await;
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn load_more_walks_back_through_history() {
    let transport = ScriptedTransport::new(viewer());
    transport.seed_history(history(120));
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());

    let snapshot = connected(&mut handle).await;
    assert_eq!(snapshot.messages.len(), 50);
    assert!(snapshot.has_more);

    handle.load_more().await.unwrap();
    let snapshot = settle(&mut handle, |s| s.messages.len() == 100 && !s.is_loading).await;
    assert!(snapshot.has_more);

    handle.load_more().await.unwrap();
    let snapshot = settle(&mut handle, |s| s.messages.len() == 120 && !s.is_loading).await;
    assert!(!snapshot.has_more);
    assert_eq!(snapshot.messages[0].id, MessageId::new("old-000"));
    assert!(snapshot.messages.windows(2).all(|w| w[0].created_at <= w[1].created_at));

    handle.load_more().await.unwrap();
    let pages = transport.calls().iter().filter(|c| matches!(c, Call::FetchPage { .. })).count();
    assert_eq!(pages, 3);
}

#[tokio::test(start_paused = true)]
async fn failed_page_reports_error_and_keeps_messages() {
    let transport = ScriptedTransport::new(viewer());
    transport.seed_history(history(80));
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    transport.fail_next_page("timeout");
    handle.load_more().await.unwrap();
    let snapshot = settle(&mut handle, |s| s.page_error.is_some()).await;
    assert_eq!(snapshot.messages.len(), 50);
    assert!(snapshot.has_more);

    handle.load_more().await.unwrap();
    let snapshot = settle(&mut handle, |s| s.messages.len() == 80).await;
    assert!(snapshot.page_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn message_pushed_during_slow_initial_page_survives() {
    let transport = ScriptedTransport::new(viewer());
    transport.seed_history(history(20));
    transport.set_open_latency(Duration::from_secs(1));
    transport.set_page_latency(Duration::from_secs(5));
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());

    let snapshot =
        settle(&mut handle, |s| s.status == ConnectionStatus::Connected && s.is_loading).await;
    assert!(snapshot.messages.is_empty());

    let mut live = Message::optimistic(
        MessageId::new("live-1"),
        &MessageDraft::text("are you free on the 14th?"),
        &artist(),
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    );
    live.is_own = false;
    assert!(transport.push(StreamEvent::Message { data: live, timestamp: None }));
    settle(&mut handle, |s| s.messages.len() == 1).await;

    let snapshot = settle(&mut handle, |s| !s.is_loading).await;
    assert_eq!(snapshot.messages.len(), 21);
    assert_eq!(snapshot.messages[0].id, MessageId::new("old-000"));
    assert_eq!(snapshot.messages[20].id, MessageId::new("live-1"));
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_slow_open_drops_the_stream() {
    let transport = ScriptedTransport::new(viewer());
    transport.set_open_latency(Duration::from_secs(5));
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());

    settle(&mut handle, |s| s.status == ConnectionStatus::Connecting).await;
    handle.disconnect().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.snapshot().status, ConnectionStatus::Disconnected);
    assert_eq!(transport.open_count(), 1);
    assert!(!transport.is_streaming());
}

#[tokio::test(start_paused = true)]
async fn disabled_conversation_stays_idle() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, _task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    handle.set_enabled(false).await.unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.status, ConnectionStatus::Disconnected);

    transport.fail_stream("late failure");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.open_count(), 1);

    assert!(matches!(handle.reconnect().await, Err(RuntimeError::Chat(_))));

    handle.set_enabled(true).await.unwrap();
    connected(&mut handle).await;
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_runtime() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    handle.shutdown().await.unwrap();
    task.await.unwrap().unwrap();

    assert!(!transport.is_streaming());
    let result = handle.send_message(MessageDraft::text("anyone?")).await;
    assert!(matches!(result, Err(RuntimeError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_the_runtime() {
    let transport = ScriptedTransport::new(viewer());
    let (mut handle, task) = spawn(&transport, ChatConfig::default());
    connected(&mut handle).await;

    drop(handle);
    task.await.unwrap().unwrap();
    assert!(!transport.is_streaming());
}
