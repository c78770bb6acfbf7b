//! Pagination cache.
//!
//! [`Timeline`] is the single authoritative, ordered, de-duplicated list of
//! messages for a conversation. History is loaded backwards with a cursor
//! (the oldest loaded message id) while live messages append at the end.
//!
//! # Invariants
//!
//! - Every message id appears at most once.
//! - At most one page request is in flight; a second request while one is
//!   outstanding is refused without side effects.
//! - A failed page leaves messages, cursor, and `has_more` untouched.
//! - Optimistic messages are confirmed in place, keeping their position.

use chrono::{DateTime, Utc};

use crate::{
    error::ChatError,
    message::{DeliveryStatus, Message, MessageId, MessagePatch, Page},
};

/// Messages fetched per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Page fetch to be executed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Correlates the response with the request.
    pub id: u64,
    /// Maximum messages to return.
    pub limit: usize,
    /// Return messages older than this one. `None` fetches the newest page.
    pub before: Option<MessageId>,
}

impl PageRequest {
    /// True for the newest-page fetch.
    pub fn is_initial(&self) -> bool {
        self.before.is_none()
    }
}

/// What a completed page did to the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Initial page replaced the list.
    Replaced {
        /// Messages now in the timeline.
        count: usize,
    },
    /// Older page prepended unseen messages.
    Prepended {
        /// Messages added.
        added: usize,
    },
    /// Response did not match the in-flight request and was dropped.
    Stale,
}

/// Ordered, de-duplicated message list with cursor pagination.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    cursor: Option<MessageId>,
    has_more: bool,
    loaded: bool,
    in_flight: Option<PageRequest>,
    next_request_id: u64,
    last_error: Option<String>,
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in timeline order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if no messages are loaded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Look up a message by id.
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|index| &self.messages[index])
    }

    /// True if a message with this id is present.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    /// Oldest loaded message id.
    pub fn cursor(&self) -> Option<&MessageId> {
        self.cursor.as_ref()
    }

    /// Whether older pages exist.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// True once the newest page has loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// True while a page request is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The outstanding page request.
    pub fn in_flight(&self) -> Option<&PageRequest> {
        self.in_flight.as_ref()
    }

    /// Error from the last failed page, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Request the newest page. `None` if a request is already in flight.
    pub fn begin_initial(&mut self, limit: usize) -> Option<PageRequest> {
        self.begin(limit, None)
    }

    /// Request the page older than the cursor.
    ///
    /// `None` (no-op) if a request is in flight, nothing older exists, or the
    /// initial page has not loaded.
    pub fn begin_load_more(&mut self, limit: usize) -> Option<PageRequest> {
        if !self.has_more {
            return None;
        }
        let before = self.cursor.clone()?;
        self.begin(limit, Some(before))
    }

    fn begin(&mut self, limit: usize, before: Option<MessageId>) -> Option<PageRequest> {
        if self.in_flight.is_some() {
            tracing::debug!("page request refused: another is in flight");
            return None;
        }

        self.next_request_id += 1;
        let request = PageRequest { id: self.next_request_id, limit, before };
        self.in_flight = Some(request.clone());
        Some(request)
    }

    /// Apply a page response.
    pub fn complete_page(&mut self, request_id: u64, page: Page) -> PageOutcome {
        let Some(request) = self.take_in_flight(request_id) else {
            tracing::warn!(request_id, "dropping stale page response");
            return PageOutcome::Stale;
        };

        self.last_error = None;
        self.has_more = page.has_more;

        let outcome = if request.is_initial() {
            // Unconfirmed local sends survive the replacement, and so do live
            // messages at least as new as the page: the server may have taken
            // its snapshot before they were pushed.
            let newest = page.messages.iter().map(|message| message.created_at).max();
            let (pending, live): (Vec<_>, Vec<_>) =
                self.messages.drain(..).partition(|message| message.id.is_temporary());

            for message in page.messages {
                self.push_unique(message);
            }
            for message in live {
                if newest.is_none_or(|newest| message.created_at >= newest) {
                    self.push_unique(message);
                }
            }
            for message in pending {
                self.push_unique(message);
            }
            self.loaded = true;
            PageOutcome::Replaced { count: self.messages.len() }
        } else {
            let mut older: Vec<Message> = Vec::with_capacity(page.messages.len());
            for message in page.messages {
                let seen = self.contains(&message.id)
                    || older.iter().any(|existing| existing.id == message.id);
                if !seen {
                    older.push(message);
                }
            }

            let added = older.len();
            older.append(&mut self.messages);
            self.messages = older;
            PageOutcome::Prepended { added }
        };

        if let Some(oldest) = self.messages.iter().find(|message| !message.id.is_temporary()) {
            self.cursor = Some(oldest.id.clone());
        } else if request.is_initial() {
            self.cursor = None;
        }

        outcome
    }

    /// Record a failed page. State other than the error string is unchanged.
    ///
    /// Returns `false` for a stale response.
    pub fn fail_page(&mut self, request_id: u64, reason: impl Into<String>) -> bool {
        if self.take_in_flight(request_id).is_none() {
            return false;
        }
        self.last_error = Some(reason.into());
        true
    }

    /// Abandon the in-flight request (teardown); a late response is stale.
    pub fn cancel_in_flight(&mut self) {
        self.in_flight = None;
    }

    fn take_in_flight(&mut self, request_id: u64) -> Option<PageRequest> {
        if self.in_flight.as_ref().is_some_and(|request| request.id == request_id) {
            self.in_flight.take()
        } else {
            None
        }
    }

    /// Append a live message. Returns `false` if the id is already present.
    pub fn add_message(&mut self, message: Message) -> bool {
        self.push_unique(message)
    }

    /// Patch an existing message.
    pub fn update_message(&mut self, id: &MessageId, patch: MessagePatch) -> Result<(), ChatError> {
        let index = self.position(id).ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
        self.messages[index].apply_patch(patch);
        Ok(())
    }

    /// Advance a message's delivery state. Unknown ids and non-forward
    /// transitions are ignored. Returns `true` if the status changed.
    pub fn apply_status(
        &mut self,
        id: &MessageId,
        status: DeliveryStatus,
        at: Option<DateTime<Utc>>,
    ) -> bool {
        match self.position(id) {
            Some(index) => self.messages[index].apply_status(status, at),
            None => false,
        }
    }

    /// Replace an optimistic message with the server's copy, in place.
    ///
    /// If the server copy already arrived over the stream, that entry is
    /// folded into the optimistic slot so the id stays unique. If the
    /// optimistic entry is gone, the server copy is appended.
    pub fn confirm(&mut self, temp_id: &MessageId, confirmed: Message) {
        let mut confirmed = confirmed;
        confirmed.is_own = true;

        if let Some(echo_index) = self.position(&confirmed.id) {
            let echo = self.messages.remove(echo_index);
            confirmed.apply_status(echo.status, echo.read_at.or(echo.delivered_at));
        }

        match self.position(temp_id) {
            Some(index) => self.messages[index] = confirmed,
            None => {
                self.push_unique(confirmed);
            },
        }
    }

    /// Mark an optimistic message as failed.
    pub fn mark_failed(&mut self, id: &MessageId) -> Result<(), ChatError> {
        let index = self.position(id).ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
        self.messages[index].apply_status(DeliveryStatus::Failed, None);
        Ok(())
    }

    /// Move a failed message back to `Sent` for a manual retry and return a
    /// copy of it.
    pub fn retry_failed(&mut self, id: &MessageId) -> Result<Message, ChatError> {
        let index = self.position(id).ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
        let message = &mut self.messages[index];
        if message.status != DeliveryStatus::Failed {
            return Err(ChatError::NotRetryable(id.clone()));
        }
        message.status = DeliveryStatus::Sent;
        Ok(message.clone())
    }

    fn push_unique(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().rposition(|message| &message.id == id)
    }
}
