//! Envelope and operation request parsing.
//!
//! An envelope is one JSONL line on the wire. It carries the conversation it
//! belongs to (`session_id`, `sequence`), the recipient the router should
//! deliver it to, and the operation to run there.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DispatchError;

/// Prefix of per-call result slots seeded into a resolution context.
pub const RESULT_SLOT_PREFIX: &str = "__TEMP__";

/// A named operation with JSON arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Operation name understood by the recipient.
    pub operation: String,
    /// Operation arguments, decoded by the recipient.
    #[serde(default)]
    pub arguments: Value,
}

impl OperationRequest {
    /// Creates a request.
    pub fn new(operation: impl Into<String>, arguments: Value) -> Self {
        Self {
            operation: operation.into(),
            arguments,
        }
    }

    /// Returns the normalised operation name (trimmed).
    #[must_use]
    pub fn operation(&self) -> &str {
        self.operation.trim()
    }

    /// Decodes the arguments into a typed structure.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidArguments` if the arguments do not match
    /// the expected shape.
    pub fn decode_arguments<T: DeserializeOwned>(&self) -> Result<T, DispatchError> {
        T::deserialize(&self.arguments).map_err(|error| {
            DispatchError::invalid_arguments(format!("{}: {error}", self.operation()))
        })
    }
}

/// Conversation coordinates shared by a request and its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conversation {
    /// Conversation id chosen by the sender.
    pub session_id: String,
    /// Position of the request within the conversation.
    pub sequence: u64,
}

impl Conversation {
    /// Creates conversation coordinates.
    pub fn new(session_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            session_id: session_id.into(),
            sequence,
        }
    }

    /// Coordinates used when a frame could not be parsed far enough to
    /// recover the sender's own.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(String::new(), 0)
    }

    /// Name of the scratch slot reserved for this call's result.
    #[must_use]
    pub fn result_slot(&self) -> String {
        format!("{RESULT_SLOT_PREFIX}{}_{}", self.session_id, self.sequence)
    }
}

/// A routed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Conversation id chosen by the sender.
    pub session_id: String,
    /// Position of the message within the conversation.
    pub sequence: u64,
    /// When set, the receiver sends no reply.
    #[serde(default)]
    pub one_way: bool,
    /// Router key of the handler that should receive the payload.
    pub recipient_id: String,
    /// The operation to run.
    pub payload: OperationRequest,
}

impl MessageEnvelope {
    /// Creates a request-response envelope.
    pub fn new(
        conversation: &Conversation,
        recipient_id: impl Into<String>,
        payload: OperationRequest,
    ) -> Self {
        Self {
            session_id: conversation.session_id.clone(),
            sequence: conversation.sequence,
            one_way: false,
            recipient_id: recipient_id.into(),
            payload,
        }
    }

    /// Marks the envelope as fire-and-forget.
    #[must_use]
    pub fn into_one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    /// Parses a JSONL line into an envelope.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed before
    /// parsing.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MalformedMessage` if the line is empty or cannot
    /// be parsed as an envelope.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty message line"));
        }

        serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)
    }

    /// Validates that addressing fields are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidStructure` if the recipient or operation
    /// field is empty or contains only whitespace.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.recipient_id.trim().is_empty() {
            return Err(DispatchError::invalid_structure("recipient_id field is empty"));
        }
        if self.payload.operation().is_empty() {
            return Err(DispatchError::invalid_structure("operation field is empty"));
        }
        Ok(())
    }

    /// Returns the normalised recipient id (trimmed).
    #[must_use]
    pub fn recipient(&self) -> &str {
        self.recipient_id.trim()
    }

    /// Conversation coordinates of this envelope.
    #[must_use]
    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.session_id.clone(), self.sequence)
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
