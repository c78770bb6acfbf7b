//! Transport boundary.
//!
//! [`Transport`] is the only place where a conversation touches the network:
//! one long-lived event stream plus three request/response calls. The
//! runtime executes [`crate::ChatAction`]s against it and feeds the outcomes
//! back into the [`crate::ChatClient`] as events.

use std::future::Future;

use brightears_core::{Message, Page, PageRequest, SendMessageRequest, StreamEvent};
use futures::stream::BoxStream;

use crate::state::ConversationId;

/// Typed event stream for one conversation. Ends when the server closes it.
pub type EventStream<Err> = BoxStream<'static, Result<StreamEvent, Err>>;

/// Network operations for booking conversations.
///
/// Implementations must be cheap to clone; every outbound call runs on its own
/// clone concurrently with the stream.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Transport failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the server-push stream.
    fn open_stream(
        &self,
        conversation: &ConversationId,
    ) -> impl Future<Output = Result<EventStream<Self::Error>, Self::Error>> + Send;

    /// Post a message; returns the server copy.
    fn send_message(
        &self,
        conversation: &ConversationId,
        request: &SendMessageRequest,
    ) -> impl Future<Output = Result<Message, Self::Error>> + Send;

    /// Fetch one page of history.
    fn fetch_page(
        &self,
        conversation: &ConversationId,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page, Self::Error>> + Send;

    /// Post a typing signal.
    fn send_typing(
        &self,
        conversation: &ConversationId,
        is_typing: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
