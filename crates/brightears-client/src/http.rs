//! HTTP + SSE transport.
//!
//! Thin layer over `reqwest`: the event stream is a streaming GET decoded
//! with [`SseDecoder`], everything else is a JSON request/response. Protocol
//! logic stays in the Sans-IO [`crate::ChatClient`].

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use brightears_core::{
    Message, Page, PageRequest, SendMessageRequest, SseDecoder, StreamEvent, TypingRequest,
};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response, Url, header};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    state::ConversationId,
    transport::{EventStream, Transport},
};

/// Default timeout for request/response calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default TCP/TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header that resumes an event stream after the given event id.
const LAST_EVENT_ID: &str = "last-event-id";

/// Id of the last event delivered on any stream this transport opened.
type EventIdSlot = Arc<Mutex<Option<String>>>;

/// HTTP transport errors.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Event stream bytes could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Base URL cannot carry a path.
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
}

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Marketplace origin, e.g. `https://brightears.example`.
    pub base_url: String,
    /// Bearer token from the identity provider.
    pub auth_token: Option<String>,
    /// Timeout for request/response calls. The stream has none.
    pub request_timeout: Duration,
    /// Connect timeout for every call, including the stream.
    pub connect_timeout: Duration,
}

impl HttpConfig {
    /// Configuration with default timeouts and no token.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Send responses arrive either bare or wrapped in `{"message": ...}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SendResponse {
    Wrapped { message: Message },
    Bare(Message),
}

impl SendResponse {
    fn into_message(self) -> Message {
        match self {
            Self::Wrapped { message } | Self::Bare(message) => message,
        }
    }
}

/// [`Transport`] over HTTPS and Server-Sent Events.
///
/// Reopened streams send `Last-Event-ID` so the server can replay what was
/// missed. Clones share that id, so use one transport per conversation.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: Arc<HttpConfig>,
    last_event_id: EventIdSlot,
}

impl HttpTransport {
    /// Build a transport. Fails only if the TLS backend cannot initialize.
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        Url::parse(&config.base_url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        let http = reqwest::Client::builder().connect_timeout(config.connect_timeout).build()?;
        Ok(Self { http, config: Arc::new(config), last_event_id: EventIdSlot::default() })
    }

    /// Id of the last event received, if the server sends ids.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `{base}/api/bookings/{id}/{tail...}`
    fn url(&self, conversation: &ConversationId, tail: &[&str]) -> Result<Url, HttpError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| HttpError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "bookings", conversation.as_str()])
            .extend(tail);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn check(response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpError::Status { status: status.as_u16(), body })
}

/// Decode a byte stream into typed events.
///
/// Frames whose payload is not a known event are logged and skipped. A
/// transport or framing error ends the stream after yielding the error.
/// Every dispatched frame's id is stored in `last_event_id`.
fn decode_events<S>(bytes: S, last_event_id: EventIdSlot) -> EventStream<HttpError>
where
    S: futures::Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut bytes = Box::pin(bytes);

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(HttpError::Request(e));
                    return;
                },
            };

            let frames = match decoder.feed(&chunk) {
                Ok(frames) => frames,
                Err(e) => {
                    yield Err(HttpError::Decode(e.to_string()));
                    return;
                },
            };

            for frame in frames {
                if let Some(id) = &frame.id {
                    *last_event_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id.clone());
                }
                match StreamEvent::decode(&frame.data) {
                    Ok(event) => yield Ok(event),
                    Err(e) => warn!(error = %e, event = ?frame.event, "skipping malformed stream payload"),
                }
            }
        }
        debug!("event stream ended");
    }
    .boxed()
}

impl Transport for HttpTransport {
    type Error = HttpError;

    async fn open_stream(
        &self,
        conversation: &ConversationId,
    ) -> Result<EventStream<HttpError>, HttpError> {
        let url = self.url(conversation, &["messages", "stream"])?;
        debug!(%url, "opening event stream");

        let mut request = self
            .http
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(id) = self.last_event_id() {
            debug!(last_event_id = %id, "resuming event stream");
            request = request.header(LAST_EVENT_ID, id);
        }
        let response = check(self.authorize(request).send().await?).await?;

        Ok(decode_events(response.bytes_stream(), self.last_event_id.clone()))
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        request: &SendMessageRequest,
    ) -> Result<Message, HttpError> {
        let url = self.url(conversation, &["messages"])?;
        let builder = self.http.post(url).timeout(self.config.request_timeout).json(request);
        let response = check(self.authorize(builder).send().await?).await?;

        Ok(response.json::<SendResponse>().await?.into_message())
    }

    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        request: &PageRequest,
    ) -> Result<Page, HttpError> {
        let url = self.url(conversation, &["messages"])?;
        let mut query = vec![("limit", request.limit.to_string())];
        if let Some(before) = &request.before {
            query.push(("before", before.as_str().to_string()));
        }

        let builder = self.http.get(url).timeout(self.config.request_timeout).query(&query);
        let response = check(self.authorize(builder).send().await?).await?;

        Ok(response.json::<Page>().await?)
    }

    async fn send_typing(
        &self,
        conversation: &ConversationId,
        is_typing: bool,
    ) -> Result<(), HttpError> {
        let url = self.url(conversation, &["typing"])?;
        let builder = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .json(&TypingRequest { is_typing });
        check(self.authorize(builder).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn urls_nest_under_booking() {
        let transport = HttpTransport::new(HttpConfig::new("https://brightears.example/")).unwrap();
        let conversation = ConversationId::from("bk 1");

        let stream = transport.url(&conversation, &["messages", "stream"]).unwrap();
        assert_eq!(stream.as_str(), "https://brightears.example/api/bookings/bk%201/messages/stream");

        let typing = transport.url(&conversation, &["typing"]).unwrap();
        assert_eq!(typing.path(), "/api/bookings/bk%201/typing");
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(matches!(
            HttpTransport::new(HttpConfig::new("not a url")),
            Err(HttpError::InvalidUrl(_))
        ));
    }

    #[test]
    fn send_response_accepts_both_shapes() {
        let message = r#"{"id":"m1","content":"hi","createdAt":"2024-01-01T00:00:00Z",
            "sender":{"id":"u1","name":"Nok","role":"CUSTOMER"}}"#;
        let wrapped = format!(r#"{{"message":{message}}}"#);

        let bare: SendResponse = serde_json::from_str(message).unwrap();
        let wrapped: SendResponse = serde_json::from_str(&wrapped).unwrap();
        assert_eq!(bare.into_message().id.as_str(), "m1");
        assert_eq!(wrapped.into_message().id.as_str(), "m1");
    }

    #[tokio::test]
    async fn decodes_chunked_events_and_skips_garbage() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b": hello\n\ndata: {\"type\":\"pi")),
            Ok(Bytes::from_static(b"ng\"}\n\ndata: not json\n\n")),
            Ok(Bytes::from_static(b"data: {\"type\":\"typing\",\"data\":{\"userId\":\"u2\",")),
            Ok(Bytes::from_static(b"\"userName\":\"Ploy\",\"isTyping\":true}}\n\n")),
        ];

        let events: Vec<_> =
            decode_events(futures::stream::iter(chunks), EventIdSlot::default()).collect().await;
        let kinds: Vec<_> =
            events.iter().map(|event| event.as_ref().map(StreamEvent::kind).ok()).collect();
        assert_eq!(kinds, vec![Some("ping"), Some("typing")]);
    }

    #[tokio::test]
    async fn remembers_last_event_id_across_streams() {
        let transport = HttpTransport::new(HttpConfig::new("https://brightears.example")).unwrap();
        assert_eq!(transport.last_event_id(), None);

        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![Ok(Bytes::from_static(
            b"id: 41\ndata: {\"type\":\"ping\"}\n\nid: 42\ndata: {\"type\":\"ping\"}\n\nid: 43\n",
        ))];
        let events: Vec<_> =
            decode_events(futures::stream::iter(chunks), transport.last_event_id.clone())
                .collect()
                .await;

        assert_eq!(events.len(), 2);
        // The trailing id belongs to a frame that never completed.
        assert_eq!(transport.clone().last_event_id().as_deref(), Some("42"));
    }
}
