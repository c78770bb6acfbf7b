//! Conversation state machine.
//!
//! [`ChatClient`] owns everything known about one booking conversation: the
//! stream status, the reconnect controller, the quality monitor, typing state
//! in both directions, and the message timeline. It is driven purely by
//! [`ChatEvent`]s and answers with [`ChatAction`]s.
//!
//! # Connection lifecycle
//!
//! ```text
//!                 Start / ManualReconnect / retry due
//! ┌──────────────┐ ───────────────────────────────> ┌────────────┐
//! │ Disconnected │                                  │ Connecting │
//! └──────────────┘ <──── Disconnect / Shutdown ──── └────────────┘
//!        ↑                                             │      │ StreamFailed
//!        │ Disconnect            StreamOpened          │      ↓
//!        │                ┌───────────┐ <──────────────┘  ┌───────┐
//!        └─────────────── │ Connected │ ── failure ─────> │ Error │
//!                         └───────────┘  (or dead        └───────┘
//!                                         heartbeat)  backoff retry
//! ```

use brightears_core::{
    ChatError, ConnectionQuality, Environment, Message, MessageDraft, MessageId, Page,
    QualityMonitor, ReconnectDecision, Reconnector, SendMessageRequest, StreamEvent, Timeline,
    TypingCoordinator, TypingIndicators, TypingSignal, TypingUser, Viewer,
};
use tracing::{debug, info, warn};

use crate::{
    event::{ChatAction, ChatEvent},
    state::{ChatConfig, ChatSnapshot, ConnectionStatus, ConversationId},
};

/// Client for one booking conversation.
pub struct ChatClient<E: Environment> {
    /// Environment for time, randomness, and wall-clock timestamps.
    env: E,

    config: ChatConfig,
    conversation_id: ConversationId,
    viewer: Viewer,

    /// Host-controlled switch; nothing connects while false.
    enabled: bool,

    /// Set by [`ChatEvent::Shutdown`]; terminal.
    shut_down: bool,

    status: ConnectionStatus,
    active_users: u32,
    connection_id: Option<String>,

    reconnector: Reconnector<E::Instant>,
    quality: QualityMonitor<E::Instant>,
    typing: TypingCoordinator<E::Instant>,
    remote_typing: TypingIndicators<E::Instant>,
    timeline: Timeline,

    last_error: Option<String>,
}

impl<E: Environment> ChatClient<E> {
    /// Create an idle client. Nothing happens until [`ChatEvent::Start`].
    pub fn new(env: E, conversation_id: ConversationId, viewer: Viewer, config: ChatConfig) -> Self {
        Self {
            env,
            reconnector: Reconnector::new(config.reconnect.clone()),
            quality: QualityMonitor::new(config.quality.clone()),
            typing: TypingCoordinator::new(config.typing.clone()),
            remote_typing: TypingIndicators::new(config.typing.auto_stop),
            config,
            conversation_id,
            viewer,
            enabled: true,
            shut_down: false,
            status: ConnectionStatus::Disconnected,
            active_users: 0,
            connection_id: None,
            timeline: Timeline::new(),
            last_error: None,
        }
    }

    /// Conversation this client is bound to.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Identity messages are sent as.
    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Whether the host allows the conversation to connect.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True after [`ChatEvent::Shutdown`].
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Stream status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Heartbeat-derived health.
    pub fn quality(&self) -> ConnectionQuality {
        self.quality.quality()
    }

    /// Connected participants, as last reported by the server.
    pub fn active_users(&self) -> u32 {
        self.active_users
    }

    /// Server-assigned id of the current stream.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Automatic retries since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnector.attempts()
    }

    /// Automatic reconnects gave up; only [`ChatEvent::ManualReconnect`]
    /// connects again.
    pub fn needs_manual_reconnect(&self) -> bool {
        self.reconnector.is_exhausted()
    }

    /// Timeline, oldest first.
    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    /// Message timeline.
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Remote users typing at `now`.
    pub fn typing_users(&self, now: E::Instant) -> Vec<TypingUser> {
        self.remote_typing.active(now)
    }

    /// Last connection or send error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Earliest instant at which a [`ChatEvent::Tick`] has work to do.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        [
            self.reconnector.deadline(),
            self.quality.deadline(),
            self.typing.deadline(),
            self.remote_typing.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Copy of the observable state at `now`.
    pub fn snapshot(&self, now: E::Instant) -> ChatSnapshot {
        ChatSnapshot {
            status: self.status,
            quality: self.quality.quality(),
            active_users: self.active_users,
            connection_id: self.connection_id.clone(),
            reconnect_attempts: self.reconnector.attempts(),
            needs_manual_reconnect: self.reconnector.is_exhausted(),
            messages: self.timeline.messages().to_vec(),
            typing_users: self.remote_typing.active(now),
            has_more: self.timeline.has_more(),
            is_loading: self.timeline.is_loading(),
            last_error: self.last_error.clone(),
            page_error: self.timeline.last_error().map(str::to_string),
        }
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: ChatEvent<E::Instant>) -> Result<Vec<ChatAction>, ChatError> {
        if self.shut_down && !matches!(event, ChatEvent::Shutdown) {
            return Err(ChatError::InvalidState {
                state: "shut down".to_string(),
                operation: event.name().to_string(),
            });
        }

        match event {
            ChatEvent::Start => Ok(self.handle_start()),
            ChatEvent::SetEnabled { enabled } => Ok(self.handle_set_enabled(enabled)),
            ChatEvent::StreamOpened => Ok(self.handle_stream_opened()),
            ChatEvent::Received(event) => Ok(self.handle_stream_event(event)),
            ChatEvent::StreamFailed { reason } => Ok(self.handle_stream_failed(reason)),
            ChatEvent::Tick { now } => Ok(self.handle_tick(now)),
            ChatEvent::Disconnect => Ok(self.handle_disconnect()),
            ChatEvent::ManualReconnect => self.handle_manual_reconnect(),
            ChatEvent::SendMessage(draft) => self.handle_send(&draft),
            ChatEvent::MessageSent { temp_id, message } => {
                self.timeline.confirm(&temp_id, message);
                Ok(vec![])
            },
            ChatEvent::MessageFailed { temp_id, reason } => {
                self.handle_send_failed(&temp_id, reason)
            },
            ChatEvent::RetryMessage { id } => self.handle_retry(&id),
            ChatEvent::LoadInitial => Ok(self.load_initial().into_iter().collect()),
            ChatEvent::LoadMore => Ok(self
                .timeline
                .begin_load_more(self.config.page_size)
                .map(ChatAction::FetchPage)
                .into_iter()
                .collect()),
            ChatEvent::PageLoaded { request_id, page } => {
                self.handle_page(request_id, page);
                Ok(vec![])
            },
            ChatEvent::PageFailed { request_id, reason } => {
                if self.timeline.fail_page(request_id, reason.clone()) {
                    warn!(conversation = %self.conversation_id, request_id, %reason, "page fetch failed");
                }
                Ok(vec![])
            },
            ChatEvent::InputChanged { text } => {
                let now = self.env.now();
                Ok(typing_action(self.typing.on_input(&text, now)).into_iter().collect())
            },
            ChatEvent::InputBlurred => Ok(typing_action(self.typing.stop()).into_iter().collect()),
            ChatEvent::Shutdown => Ok(self.handle_shutdown()),
        }
    }

    fn handle_start(&mut self) -> Vec<ChatAction> {
        if !self.enabled {
            debug!(conversation = %self.conversation_id, "start ignored: conversation disabled");
            return vec![];
        }

        let mut actions = Vec::new();
        if matches!(self.status, ConnectionStatus::Disconnected | ConnectionStatus::Error)
            && self.reconnector.deadline().is_none()
        {
            self.reconnector.manual();
            actions.extend(self.open());
        }

        if !self.timeline.is_loaded() {
            actions.extend(self.load_initial());
        }
        actions
    }

    fn handle_set_enabled(&mut self, enabled: bool) -> Vec<ChatAction> {
        if self.enabled == enabled {
            return vec![];
        }
        self.enabled = enabled;

        if enabled { self.handle_start() } else { self.handle_disconnect() }
    }

    fn handle_stream_opened(&mut self) -> Vec<ChatAction> {
        if self.status != ConnectionStatus::Connecting {
            // Disconnected while the open was in flight.
            debug!(conversation = %self.conversation_id, status = %self.status, "dropping unexpected stream");
            return vec![ChatAction::CloseStream];
        }

        info!(conversation = %self.conversation_id, "stream connected");
        self.status = ConnectionStatus::Connected;
        self.last_error = None;
        self.reconnector.on_connected();
        self.quality.start(self.env.now());
        vec![]
    }

    fn handle_stream_event(&mut self, event: StreamEvent) -> Vec<ChatAction> {
        if self.status != ConnectionStatus::Connected {
            warn!(conversation = %self.conversation_id, kind = event.kind(), "event on inactive stream ignored");
            return vec![];
        }

        let now = self.env.now();
        self.quality.heartbeat(now);

        match event {
            StreamEvent::Connected { data, .. } => {
                debug!(connection_id = %data.connection_id, active_users = data.active_users, "stream acknowledged");
                self.connection_id = Some(data.connection_id);
                self.active_users = data.active_users;
            },
            StreamEvent::Message { data, .. } => {
                let mut message = data;
                message.is_own = message.sender.id == self.viewer.id;
                self.remote_typing.clear(&message.sender.id);
                if !self.timeline.add_message(message) {
                    debug!(conversation = %self.conversation_id, "duplicate message ignored");
                }
            },
            StreamEvent::Typing { data, .. } => {
                if data.user_id != self.viewer.id {
                    self.remote_typing.apply(&data.user_id, &data.user_name, data.is_typing, now);
                }
            },
            StreamEvent::DeliveryStatus { data, timestamp } => {
                let at = data.timestamp.or(timestamp);
                if !self.timeline.apply_status(&data.message_id, data.status, at) {
                    debug!(message_id = %data.message_id, status = ?data.status, "status update not applied");
                }
            },
            StreamEvent::Ping { .. } => {},
        }
        vec![]
    }

    fn handle_stream_failed(&mut self, reason: String) -> Vec<ChatAction> {
        if !matches!(self.status, ConnectionStatus::Connecting | ConnectionStatus::Connected) {
            debug!(conversation = %self.conversation_id, %reason, "failure of inactive stream ignored");
            return vec![];
        }
        self.fail_stream(reason, ConnectionStatus::Error)
    }

    /// Close the stream and hand off to the reconnect controller.
    fn fail_stream(&mut self, reason: String, status: ConnectionStatus) -> Vec<ChatAction> {
        warn!(conversation = %self.conversation_id, %reason, "stream lost");
        self.status = status;
        self.quality.stop();
        self.connection_id = None;
        self.remote_typing.reset();
        self.last_error = Some(ChatError::Transport(reason).to_string());

        if !self.config.auto_reconnect {
            return vec![ChatAction::CloseStream];
        }

        match self.reconnector.on_failure(self.env.now()) {
            ReconnectDecision::RetryAt { delay, attempt, .. } => {
                info!(conversation = %self.conversation_id, attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            },
            ReconnectDecision::GiveUp { attempts } => {
                warn!(conversation = %self.conversation_id, attempts, "reconnect gave up");
                self.last_error = Some(ChatError::ReconnectExhausted { attempts }.to_string());
            },
            ReconnectDecision::Suppressed => {},
        }
        vec![ChatAction::CloseStream]
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ChatAction> {
        let mut actions = Vec::new();

        if let Some(quality) = self.quality.poll(now) {
            if quality == ConnectionQuality::Disconnected {
                actions.extend(
                    self.fail_stream("heartbeat lost".to_string(), ConnectionStatus::Disconnected),
                );
            } else {
                debug!(conversation = %self.conversation_id, ?quality, "connection quality changed");
            }
        }

        if self.reconnector.poll(now) {
            actions.extend(self.open());
        }

        if let Some(action) = typing_action(self.typing.poll(now)) {
            actions.push(action);
        }

        self.remote_typing.expire(now);
        actions
    }

    fn handle_disconnect(&mut self) -> Vec<ChatAction> {
        info!(conversation = %self.conversation_id, "disconnect requested");
        self.reconnector.cancel();
        self.quality.stop();
        self.remote_typing.reset();
        self.connection_id = None;
        self.status = ConnectionStatus::Disconnected;

        let mut actions = vec![ChatAction::CloseStream];
        actions.extend(typing_action(self.typing.stop()));
        actions
    }

    fn handle_manual_reconnect(&mut self) -> Result<Vec<ChatAction>, ChatError> {
        if !self.enabled {
            return Err(ChatError::InvalidState {
                state: "disabled".to_string(),
                operation: "reconnect".to_string(),
            });
        }

        info!(conversation = %self.conversation_id, "manual reconnect");
        self.reconnector.manual();
        self.quality.stop();
        self.last_error = None;

        let mut actions = vec![ChatAction::CloseStream];
        actions.extend(self.open());
        Ok(actions)
    }

    fn handle_send(&mut self, draft: &MessageDraft) -> Result<Vec<ChatAction>, ChatError> {
        draft.validate()?;

        let temp_id = MessageId::temporary(self.env.random_u64());
        let message =
            Message::optimistic(temp_id.clone(), draft, &self.viewer, self.env.wall_clock());
        self.timeline.add_message(message);
        debug!(conversation = %self.conversation_id, %temp_id, "optimistic message added");

        let mut actions: Vec<_> = typing_action(self.typing.stop()).into_iter().collect();
        actions.push(ChatAction::PostMessage { temp_id, request: SendMessageRequest::from(draft) });
        Ok(actions)
    }

    fn handle_send_failed(
        &mut self,
        temp_id: &MessageId,
        reason: String,
    ) -> Result<Vec<ChatAction>, ChatError> {
        warn!(conversation = %self.conversation_id, %temp_id, %reason, "message send failed");
        self.timeline.mark_failed(temp_id)?;
        self.last_error = Some(ChatError::SendFailed(reason).to_string());
        Ok(vec![])
    }

    fn handle_retry(&mut self, id: &MessageId) -> Result<Vec<ChatAction>, ChatError> {
        let message = self.timeline.retry_failed(id)?;
        debug!(conversation = %self.conversation_id, %id, "retrying message");
        Ok(vec![ChatAction::PostMessage {
            temp_id: id.clone(),
            request: SendMessageRequest::from(&message),
        }])
    }

    fn handle_page(&mut self, request_id: u64, page: Page) {
        let mut page = page;
        for message in &mut page.messages {
            message.is_own = message.sender.id == self.viewer.id;
        }
        let outcome = self.timeline.complete_page(request_id, page);
        debug!(conversation = %self.conversation_id, request_id, ?outcome, "page applied");
    }

    fn handle_shutdown(&mut self) -> Vec<ChatAction> {
        if self.shut_down {
            return vec![];
        }

        info!(conversation = %self.conversation_id, "shutting down");
        self.shut_down = true;
        self.reconnector.cancel();
        self.quality.stop();
        // The server expires typing on its own; no signal is sent on unmount.
        self.typing.stop();
        self.remote_typing.reset();
        self.timeline.cancel_in_flight();
        self.connection_id = None;
        self.status = ConnectionStatus::Disconnected;
        vec![ChatAction::CloseStream]
    }

    fn open(&mut self) -> Option<ChatAction> {
        if !self.enabled {
            return None;
        }
        debug!(conversation = %self.conversation_id, attempt = self.reconnector.attempts(), "opening stream");
        self.status = ConnectionStatus::Connecting;
        Some(ChatAction::OpenStream)
    }

    fn load_initial(&mut self) -> Option<ChatAction> {
        self.timeline.begin_initial(self.config.page_size).map(ChatAction::FetchPage)
    }
}

fn typing_action(signal: Option<TypingSignal>) -> Option<ChatAction> {
    signal.map(|signal| ChatAction::PostTyping { is_typing: signal.is_typing() })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::{Duration, Instant},
    };

    use brightears_core::{
        ConnectedData, DeliveryStatus, DeliveryStatusData, Sender, SenderRole, TypingData,
    };
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    /// Manually advanced clock over `std::time::Instant`.
    #[derive(Clone)]
    struct TestEnv {
        start: Instant,
        offset_ms: Arc<AtomicU64>,
        counter: Arc<AtomicU64>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                offset_ms: Arc::new(AtomicU64::new(0)),
                counter: Arc::new(AtomicU64::new(0)),
            }
        }

        fn advance(&self, duration: Duration) -> Instant {
            self.offset_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
            self.now()
        }
    }

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            self.start + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
        }

        async fn sleep(&self, _duration: Duration) {}

        fn random_bytes(&self, buffer: &mut [u8]) {
            let value = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = value.to_be_bytes()[i % 8];
            }
        }

        fn wall_clock(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
        }
    }

    fn viewer() -> Viewer {
        Sender { id: "cust-1".into(), name: "Nok".into(), role: SenderRole::Customer, avatar: None }
    }

    fn artist() -> Sender {
        Sender { id: "art-1".into(), name: "DJ Ploy".into(), role: SenderRole::Artist, avatar: None }
    }

    fn server_message(id: &str, sender: Sender) -> Message {
        let mut message = Message::optimistic(
            MessageId::from(id),
            &MessageDraft::text(format!("hello from {id}")),
            &sender,
            Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
        );
        message.is_own = false;
        message
    }

    fn client() -> (ChatClient<TestEnv>, TestEnv) {
        let env = TestEnv::new();
        let client =
            ChatClient::new(env.clone(), ConversationId::from("bk-1"), viewer(), ChatConfig::default());
        (client, env)
    }

    fn connected() -> (ChatClient<TestEnv>, TestEnv) {
        let (mut client, env) = client();
        client.handle(ChatEvent::Start).unwrap();
        client.handle(ChatEvent::StreamOpened).unwrap();
        (client, env)
    }

    fn fail(client: &mut ChatClient<TestEnv>) -> Vec<ChatAction> {
        client.handle(ChatEvent::StreamFailed { reason: "reset".into() }).unwrap()
    }

    #[test]
    fn start_opens_stream_and_fetches_history() {
        let (mut client, _) = client();
        let actions = client.handle(ChatEvent::Start).unwrap();

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], ChatAction::OpenStream);
        assert!(matches!(&actions[1], ChatAction::FetchPage(request) if request.is_initial()));
        assert_eq!(client.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn disabled_client_does_nothing() {
        let (mut client, _) = client();
        assert_eq!(client.handle(ChatEvent::SetEnabled { enabled: false }).unwrap(), vec![
            ChatAction::CloseStream
        ]);
        assert!(client.handle(ChatEvent::Start).unwrap().is_empty());
        assert!(client.handle(ChatEvent::ManualReconnect).is_err());

        let actions = client.handle(ChatEvent::SetEnabled { enabled: true }).unwrap();
        assert_eq!(actions[0], ChatAction::OpenStream);
    }

    #[test]
    fn stream_opened_resets_attempts() {
        let (mut client, env) = connected();
        fail(&mut client);
        env.advance(Duration::from_secs(1));
        client.handle(ChatEvent::Tick { now: env.now() }).unwrap();
        assert_eq!(client.reconnect_attempts(), 1);

        client.handle(ChatEvent::StreamOpened).unwrap();
        assert_eq!(client.status(), ConnectionStatus::Connected);
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(client.quality(), ConnectionQuality::Excellent);
    }

    #[test]
    fn connected_event_records_presence() {
        let (mut client, _) = connected();
        client
            .handle(ChatEvent::Received(StreamEvent::Connected {
                data: ConnectedData { connection_id: "c-9".into(), active_users: 2 },
                timestamp: None,
            }))
            .unwrap();

        assert_eq!(client.connection_id(), Some("c-9"));
        assert_eq!(client.active_users(), 2);
    }

    #[test]
    fn incoming_message_clears_sender_typing() {
        let (mut client, env) = connected();
        client
            .handle(ChatEvent::Received(StreamEvent::Typing {
                data: TypingData { user_id: "art-1".into(), user_name: "DJ Ploy".into(), is_typing: true },
                timestamp: None,
            }))
            .unwrap();
        assert_eq!(client.typing_users(env.now()).len(), 1);

        client
            .handle(ChatEvent::Received(StreamEvent::Message {
                data: server_message("m1", artist()),
                timestamp: None,
            }))
            .unwrap();

        assert!(client.typing_users(env.now()).is_empty());
        assert_eq!(client.messages().len(), 1);
        assert!(!client.messages()[0].is_own);
    }

    #[test]
    fn own_typing_echo_is_ignored() {
        let (mut client, env) = connected();
        client
            .handle(ChatEvent::Received(StreamEvent::Typing {
                data: TypingData { user_id: "cust-1".into(), user_name: "Nok".into(), is_typing: true },
                timestamp: None,
            }))
            .unwrap();
        assert!(client.typing_users(env.now()).is_empty());
    }

    #[test]
    fn duplicate_stream_message_is_dropped() {
        let (mut client, _) = connected();
        for _ in 0..3 {
            client
                .handle(ChatEvent::Received(StreamEvent::Message {
                    data: server_message("m1", artist()),
                    timestamp: None,
                }))
                .unwrap();
        }
        assert_eq!(client.messages().len(), 1);
    }

    #[test]
    fn delivery_status_advances() {
        let (mut client, _) = connected();
        client
            .handle(ChatEvent::Received(StreamEvent::Message {
                data: server_message("m1", viewer()),
                timestamp: None,
            }))
            .unwrap();
        assert!(client.messages()[0].is_own);

        for status in [DeliveryStatus::Read, DeliveryStatus::Delivered] {
            client
                .handle(ChatEvent::Received(StreamEvent::DeliveryStatus {
                    data: DeliveryStatusData {
                        message_id: MessageId::from("m1"),
                        status,
                        timestamp: None,
                    },
                    timestamp: None,
                }))
                .unwrap();
        }
        assert_eq!(client.messages()[0].status, DeliveryStatus::Read);
    }

    #[test]
    fn failures_back_off_then_give_up() {
        let (mut client, env) = connected();
        let mut delays = Vec::new();

        for _ in 0..5 {
            let started = env.now();
            assert_eq!(fail(&mut client), vec![ChatAction::CloseStream]);
            let deadline = client.next_deadline().unwrap();
            delays.push((deadline - started).as_millis());

            env.advance(deadline - started);
            assert_eq!(client.handle(ChatEvent::Tick { now: env.now() }).unwrap(), vec![
                ChatAction::OpenStream
            ]);
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000]);

        fail(&mut client);
        assert!(client.needs_manual_reconnect());
        assert!(client.last_error().unwrap().contains("gave up"));
        assert_eq!(client.next_deadline(), None);

        let actions = client.handle(ChatEvent::ManualReconnect).unwrap();
        assert_eq!(actions, vec![ChatAction::CloseStream, ChatAction::OpenStream]);
        assert_eq!(client.reconnect_attempts(), 0);
    }

    #[test]
    fn auto_reconnect_disabled_is_terminal() {
        let env = TestEnv::new();
        let config = ChatConfig { auto_reconnect: false, ..ChatConfig::default() };
        let mut client = ChatClient::new(env, ConversationId::from("bk-1"), viewer(), config);
        client.handle(ChatEvent::Start).unwrap();
        client.handle(ChatEvent::StreamOpened).unwrap();

        fail(&mut client);
        assert_eq!(client.status(), ConnectionStatus::Error);
        assert!(client.last_error().is_some());
        assert_eq!(client.next_deadline(), None);
    }

    #[test]
    fn dead_heartbeat_triggers_reconnect() {
        let (mut client, env) = connected();

        let mut saw_close = false;
        for _ in 0..20 {
            let now = env.advance(Duration::from_secs(5));
            let actions = client.handle(ChatEvent::Tick { now }).unwrap();
            if actions.contains(&ChatAction::CloseStream) {
                saw_close = true;
                break;
            }
        }

        assert!(saw_close);
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(client.quality(), ConnectionQuality::Disconnected);
        assert_eq!(client.reconnect_attempts(), 1);
    }

    #[test]
    fn disconnect_cancels_pending_retry() {
        let (mut client, env) = connected();
        fail(&mut client);

        let actions = client.handle(ChatEvent::Disconnect).unwrap();
        assert_eq!(actions, vec![ChatAction::CloseStream]);
        assert_eq!(client.next_deadline(), None);

        let now = env.advance(Duration::from_secs(60));
        assert!(client.handle(ChatEvent::Tick { now }).unwrap().is_empty());
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn late_open_after_disconnect_is_closed() {
        let (mut client, _) = client();
        client.handle(ChatEvent::Start).unwrap();
        client.handle(ChatEvent::Disconnect).unwrap();

        assert_eq!(client.handle(ChatEvent::StreamOpened).unwrap(), vec![ChatAction::CloseStream]);
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn send_then_confirm_in_place() {
        let (mut client, _) = connected();
        client
            .handle(ChatEvent::Received(StreamEvent::Message {
                data: server_message("m1", artist()),
                timestamp: None,
            }))
            .unwrap();

        let actions = client.handle(ChatEvent::SendMessage(MessageDraft::text("  hi  "))).unwrap();
        let [ChatAction::PostMessage { temp_id, request }] = actions.as_slice() else {
            panic!("expected a single post, got {actions:?}");
        };
        assert!(temp_id.is_temporary());
        assert_eq!(request.content, "hi");
        assert_eq!(client.messages().len(), 2);

        let mut confirmed = server_message("m2", viewer());
        confirmed.content = "hi".into();
        client
            .handle(ChatEvent::MessageSent { temp_id: temp_id.clone(), message: confirmed })
            .unwrap();

        let ids: Vec<_> = client.messages().iter().map(|m| m.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(client.messages()[1].is_own);
    }

    #[test]
    fn empty_draft_is_rejected() {
        let (mut client, _) = connected();
        assert_eq!(
            client.handle(ChatEvent::SendMessage(MessageDraft::text("   "))),
            Err(ChatError::EmptyMessage)
        );
        assert!(client.messages().is_empty());
    }

    #[test]
    fn failed_send_can_be_retried() {
        let (mut client, _) = connected();
        let actions = client.handle(ChatEvent::SendMessage(MessageDraft::text("hi"))).unwrap();
        let Some(ChatAction::PostMessage { temp_id, .. }) = actions.last().cloned() else {
            panic!("expected a post");
        };

        client
            .handle(ChatEvent::MessageFailed { temp_id: temp_id.clone(), reason: "503".into() })
            .unwrap();
        assert_eq!(client.messages()[0].status, DeliveryStatus::Failed);
        assert!(client.last_error().is_some());

        let retry = client.handle(ChatEvent::RetryMessage { id: temp_id.clone() }).unwrap();
        assert!(matches!(&retry[..], [ChatAction::PostMessage { temp_id: id, .. }] if *id == temp_id));
        assert_eq!(client.messages()[0].status, DeliveryStatus::Sent);

        assert_eq!(
            client.handle(ChatEvent::RetryMessage { id: temp_id.clone() }),
            Err(ChatError::NotRetryable(temp_id))
        );
    }

    #[test]
    fn sending_stops_typing() {
        let (mut client, env) = connected();
        client.handle(ChatEvent::InputChanged { text: "h".into() }).unwrap();
        let now = env.advance(Duration::from_millis(300));
        assert_eq!(client.handle(ChatEvent::Tick { now }).unwrap(), vec![ChatAction::PostTyping {
            is_typing: true
        }]);

        let actions = client.handle(ChatEvent::SendMessage(MessageDraft::text("hi"))).unwrap();
        assert_eq!(actions[0], ChatAction::PostTyping { is_typing: false });
    }

    #[test]
    fn load_more_is_single_flight() {
        let (mut client, _) = client();
        let actions = client.handle(ChatEvent::Start).unwrap();
        let Some(ChatAction::FetchPage(initial)) = actions.last().cloned() else {
            panic!("expected initial fetch");
        };

        let page = Page {
            messages: vec![server_message("m10", artist()), server_message("m11", viewer())],
            has_more: true,
        };
        client.handle(ChatEvent::PageLoaded { request_id: initial.id, page }).unwrap();
        assert!(client.messages()[1].is_own);

        let first = client.handle(ChatEvent::LoadMore).unwrap();
        let second = client.handle(ChatEvent::LoadMore).unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());

        let ChatAction::FetchPage(request) = &first[0] else {
            panic!("expected fetch");
        };
        assert_eq!(request.before, Some(MessageId::from("m10")));

        client
            .handle(ChatEvent::PageFailed { request_id: request.id, reason: "timeout".into() })
            .unwrap();
        let snapshot = client.snapshot(Instant::now());
        assert_eq!(snapshot.page_error.as_deref(), Some("timeout"));
        assert!(snapshot.has_more);
        assert_eq!(snapshot.messages.len(), 2);
    }

    #[test]
    fn live_message_during_initial_fetch_is_kept() {
        let (mut client, _) = client();
        let actions = client.handle(ChatEvent::Start).unwrap();
        let Some(ChatAction::FetchPage(initial)) = actions.last().cloned() else {
            panic!("expected initial fetch");
        };
        client.handle(ChatEvent::StreamOpened).unwrap();
        client
            .handle(ChatEvent::Received(StreamEvent::Message {
                data: server_message("m21", artist()),
                timestamp: None,
            }))
            .unwrap();

        let page = Page {
            messages: (1..=20).map(|n| server_message(&format!("m{n}"), artist())).collect(),
            has_more: true,
        };
        client.handle(ChatEvent::PageLoaded { request_id: initial.id, page }).unwrap();

        let ids: Vec<_> = client.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 21);
        assert_eq!(ids.first(), Some(&"m1"));
        assert_eq!(ids.last(), Some(&"m21"));
        assert_eq!(client.timeline().cursor(), Some(&MessageId::from("m1")));
    }

    #[test]
    fn shutdown_clears_deadlines_and_rejects_events() {
        let (mut client, _) = connected();
        client.handle(ChatEvent::InputChanged { text: "hey".into() }).unwrap();
        fail(&mut client);
        assert!(client.next_deadline().is_some());

        assert_eq!(client.handle(ChatEvent::Shutdown).unwrap(), vec![ChatAction::CloseStream]);
        assert_eq!(client.next_deadline(), None);
        assert!(client.handle(ChatEvent::Shutdown).unwrap().is_empty());
        assert!(matches!(
            client.handle(ChatEvent::Start),
            Err(ChatError::InvalidState { .. })
        ));
    }
}
