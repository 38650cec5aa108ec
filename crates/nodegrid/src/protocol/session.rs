//! Conversation identity and sequence numbering for a sender.

use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use super::{Conversation, MessageEnvelope, OperationRequest};

/// A sender's conversation: a unique id plus a monotonically increasing
/// sequence number.
#[derive(Debug)]
pub struct MessageSession {
    id: String,
    sequence: AtomicU64,
}

impl MessageSession {
    /// Starts a conversation with a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Starts a conversation with a caller-chosen id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Conversation id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claims the next sequence number, starting at 1.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Claims the next sequence number and returns its coordinates.
    pub fn next_conversation(&self) -> Conversation {
        Conversation::new(self.id.clone(), self.next_sequence())
    }

    /// Builds a request-response envelope for `recipient_id`.
    pub fn envelope(
        &self,
        recipient_id: impl Into<String>,
        payload: OperationRequest,
    ) -> MessageEnvelope {
        MessageEnvelope::new(&self.next_conversation(), recipient_id, payload)
    }

    /// Builds a one-way envelope for `recipient_id`.
    pub fn one_way(
        &self,
        recipient_id: impl Into<String>,
        payload: OperationRequest,
    ) -> MessageEnvelope {
        self.envelope(recipient_id, payload).into_one_way()
    }
}

impl Default for MessageSession {
    fn default() -> Self {
        Self::new()
    }
}
