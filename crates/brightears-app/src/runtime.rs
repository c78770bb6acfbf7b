//! Async runtime
//!
//! Event loop that executes a [`ChatClient`]'s actions against a
//! [`Transport`] and feeds the outcomes back in. Uses `tokio::select!` to
//! handle UI commands, the event stream, completed outbound calls, and the
//! client's next deadline concurrently on a single task.
//!
//! Stream opens are tagged with a generation number. Closing or reopening
//! bumps the generation, so an open that completes afterwards is dropped
//! instead of resurrecting a stream the client no longer wants.

use brightears_client::{
    ChatAction, ChatClient, ChatConfig, ChatEvent, ChatSnapshot, ConversationId, EventStream,
    Transport, Viewer,
};
use brightears_core::{Environment, Message, MessageId, Page, StreamEvent, TimePoint};
use futures::{
    FutureExt, StreamExt,
    future::BoxFuture,
    stream::FuturesUnordered,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    error::RuntimeError,
    handle::{ChatHandle, Command, Request},
};

/// Commands buffered between the UI and the runtime.
const COMMAND_BUFFER: usize = 32;

/// Outcome of an outbound call.
enum Completion<Err> {
    StreamOpened { generation: u64, result: Result<EventStream<Err>, Err> },
    MessagePosted { temp_id: MessageId, result: Result<Message, Err> },
    PageFetched { request_id: u64, result: Result<Page, Err> },
    TypingPosted { is_typing: bool, result: Result<(), Err> },
}

/// Single-task event loop for one conversation.
///
/// # Type Parameters
///
/// - `T`: Network transport
/// - `E`: Environment providing time and randomness
pub struct Runtime<T, E>
where
    T: Transport,
    E: Environment,
{
    env: E,
    transport: T,
    client: ChatClient<E>,
    conversation: ConversationId,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<ChatSnapshot>,
    stream: Option<EventStream<T::Error>>,
    generation: u64,
    pending: FuturesUnordered<BoxFuture<'static, Completion<T::Error>>>,
}

impl<T, E> Runtime<T, E>
where
    T: Transport,
    E: Environment,
{
    /// Create a runtime and the handle that controls it.
    ///
    /// Nothing happens until [`Runtime::run`] is polled.
    pub fn new(
        env: E,
        transport: T,
        conversation: ConversationId,
        viewer: Viewer,
        config: ChatConfig,
    ) -> (Self, ChatHandle) {
        let client = ChatClient::new(env.clone(), conversation.clone(), viewer, config);
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (snapshots, snapshot_rx) = watch::channel(client.snapshot(env.now()));

        let runtime = Self {
            env,
            transport,
            client,
            conversation,
            commands,
            snapshots,
            stream: None,
            generation: 0,
            pending: FuturesUnordered::new(),
        };
        (runtime, ChatHandle::new(command_tx, snapshot_rx))
    }

    /// Run until shut down through the handle, or until every handle is
    /// dropped.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        info!(conversation = %self.conversation, "conversation runtime started");
        self.dispatch(ChatEvent::Start)?;
        self.publish();

        loop {
            let deadline = self.client.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command) {
                            break;
                        }
                    },
                    None => {
                        debug!("all handles dropped");
                        self.dispatch(ChatEvent::Shutdown)?;
                        break;
                    },
                },

                item = next_event(&mut self.stream) => match item {
                    Some(Ok(event)) => self.dispatch(ChatEvent::Received(event))?,
                    Some(Err(e)) => {
                        self.stream = None;
                        self.dispatch(ChatEvent::StreamFailed { reason: e.to_string() })?;
                    },
                    None => {
                        self.stream = None;
                        self.dispatch(ChatEvent::StreamFailed {
                            reason: "stream closed by server".to_string(),
                        })?;
                    },
                },

                Some(completion) = self.pending.next(), if !self.pending.is_empty() => {
                    self.complete(completion)?;
                },

                () = sleep_until(&self.env, deadline) => {
                    let now = self.env.now();
                    self.dispatch(ChatEvent::Tick { now })?;
                },
            }

            self.publish();
        }

        self.publish();
        info!(conversation = %self.conversation, "conversation runtime stopped");
        Ok(())
    }

    /// Apply a UI command. Returns `true` if the runtime should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        let Command { request, reply } = command;
        let stop = matches!(request, Request::Shutdown);

        let event = match request {
            Request::SendMessage(draft) => ChatEvent::SendMessage(draft),
            Request::RetryMessage(id) => ChatEvent::RetryMessage { id },
            Request::LoadMore => ChatEvent::LoadMore,
            Request::InputChanged(text) => ChatEvent::InputChanged { text },
            Request::InputBlurred => ChatEvent::InputBlurred,
            Request::Disconnect => ChatEvent::Disconnect,
            Request::Reconnect => ChatEvent::ManualReconnect,
            Request::SetEnabled(enabled) => ChatEvent::SetEnabled { enabled },
            Request::Shutdown => ChatEvent::Shutdown,
        };

        let outcome = self.client.handle(event).map(|actions| {
            let posted = actions.iter().find_map(|action| match action {
                ChatAction::PostMessage { temp_id, .. } => Some(temp_id.clone()),
                _ => None,
            });
            self.execute(actions);
            posted
        });
        if let Err(e) = &outcome {
            debug!(error = %e, "command rejected");
        }
        // The caller may have stopped waiting.
        let _ = reply.send(outcome);
        stop
    }

    /// Feed an internal event into the client.
    ///
    /// Internal events are never rejected while the runtime runs; a rejection
    /// means the client was shut down underneath the loop.
    fn dispatch(&mut self, event: ChatEvent<E::Instant>) -> Result<(), RuntimeError> {
        let actions = self.client.handle(event)?;
        self.execute(actions);
        Ok(())
    }

    fn complete(&mut self, completion: Completion<T::Error>) -> Result<(), RuntimeError> {
        match completion {
            Completion::StreamOpened { generation, result } => {
                if generation != self.generation {
                    debug!(generation, current = self.generation, "dropping stale stream open");
                    return Ok(());
                }
                match result {
                    Ok(stream) => {
                        self.stream = Some(stream);
                        self.dispatch(ChatEvent::StreamOpened)
                    },
                    Err(e) => self.dispatch(ChatEvent::StreamFailed { reason: e.to_string() }),
                }
            },
            Completion::MessagePosted { temp_id, result } => match result {
                Ok(message) => self.dispatch(ChatEvent::MessageSent { temp_id, message }),
                Err(e) => self.dispatch(ChatEvent::MessageFailed { temp_id, reason: e.to_string() }),
            },
            Completion::PageFetched { request_id, result } => match result {
                Ok(page) => self.dispatch(ChatEvent::PageLoaded { request_id, page }),
                Err(e) => self.dispatch(ChatEvent::PageFailed { request_id, reason: e.to_string() }),
            },
            Completion::TypingPosted { is_typing, result } => {
                if let Err(e) = result {
                    warn!(is_typing, error = %e, "typing signal not delivered");
                }
                Ok(())
            },
        }
    }

    fn execute(&mut self, actions: Vec<ChatAction>) {
        for action in actions {
            match action {
                ChatAction::OpenStream => {
                    self.generation += 1;
                    self.stream = None;

                    let generation = self.generation;
                    let transport = self.transport.clone();
                    let conversation = self.conversation.clone();
                    self.pending.push(
                        async move {
                            let result = transport.open_stream(&conversation).await;
                            Completion::StreamOpened { generation, result }
                        }
                        .boxed(),
                    );
                },
                ChatAction::CloseStream => {
                    self.generation += 1;
                    self.stream = None;
                },
                ChatAction::PostMessage { temp_id, request } => {
                    let transport = self.transport.clone();
                    let conversation = self.conversation.clone();
                    self.pending.push(
                        async move {
                            let result = transport.send_message(&conversation, &request).await;
                            Completion::MessagePosted { temp_id, result }
                        }
                        .boxed(),
                    );
                },
                ChatAction::FetchPage(request) => {
                    let transport = self.transport.clone();
                    let conversation = self.conversation.clone();
                    self.pending.push(
                        async move {
                            let result = transport.fetch_page(&conversation, &request).await;
                            Completion::PageFetched { request_id: request.id, result }
                        }
                        .boxed(),
                    );
                },
                ChatAction::PostTyping { is_typing } => {
                    let transport = self.transport.clone();
                    let conversation = self.conversation.clone();
                    self.pending.push(
                        async move {
                            let result = transport.send_typing(&conversation, is_typing).await;
                            Completion::TypingPosted { is_typing, result }
                        }
                        .boxed(),
                    );
                },
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.client.snapshot(self.env.now()));
    }
}

/// Next item of the current stream; pending forever when there is none.
async fn next_event<Err>(
    stream: &mut Option<EventStream<Err>>,
) -> Option<Result<StreamEvent, Err>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Sleep until `deadline`; pending forever when there is none.
async fn sleep_until<E: Environment>(env: &E, deadline: Option<E::Instant>) {
    match deadline {
        Some(deadline) => env.sleep(deadline.saturating_since(env.now())).await,
        None => std::future::pending().await,
    }
}
