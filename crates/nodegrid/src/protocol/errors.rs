//! Error types for envelope parsing and operation dispatch.
//!
//! Every variant maps onto a [`FailureClass`] so that a failure produced on
//! one side of a connection is reported identically on the other.

use std::io;

use thiserror::Error;

use super::{Failure, FailureClass};
use crate::node::CommandError;
use crate::transport::FrameError;

/// Errors surfaced while parsing or dispatching a message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Frame could not be parsed as a JSON envelope.
    #[error("malformed message: {message}")]
    MalformedMessage {
        /// What failed to parse.
        message: String,
        /// JSON parser error, when there was one.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Envelope JSON does not satisfy the envelope schema.
    #[error("invalid message structure: {message}")]
    InvalidStructure {
        /// Which part of the schema was violated.
        message: String,
    },

    /// No handler is registered under the recipient id.
    #[error("unknown recipient: {recipient}")]
    UnknownRecipient {
        /// Recipient id carried by the envelope.
        recipient: String,
    },

    /// Operation name is not one the recipient service understands.
    #[error("unknown operation '{operation}' for service '{service}'")]
    UnknownOperation {
        /// Service kind that received the request.
        service: String,
        /// Operation name as sent.
        operation: String,
    },

    /// Operation arguments are missing or malformed.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Which argument was wrong.
        message: String,
    },

    /// Frame could not be read from the stream.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Command execution failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// Internal error (e.g., a released endpoint).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the fault.
        message: String,
    },
}

impl DispatchError {
    /// Classifies the error for the wire.
    ///
    /// Addressing and framing faults are protocol errors; command failures
    /// keep their own class so callers can tell them apart from routing
    /// problems.
    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::MalformedMessage { .. }
            | Self::InvalidStructure { .. }
            | Self::UnknownRecipient { .. }
            | Self::UnknownOperation { .. }
            | Self::InvalidArguments { .. }
            | Self::Frame(_) => FailureClass::Protocol,
            Self::Command(_) => FailureClass::Command,
            Self::Io(_) | Self::SerializeResponse(_) | Self::Internal { .. } => {
                FailureClass::Internal
            }
        }
    }

    /// Converts the error into its wire form.
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        Failure::new(self.failure_class(), self.to_string())
    }

    /// Creates a malformed message error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedMessage {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed message error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an unknown recipient error.
    pub fn unknown_recipient(recipient: impl Into<String>) -> Self {
        Self::UnknownRecipient {
            recipient: recipient.into(),
        }
    }

    /// Creates an unknown operation error.
    pub fn unknown_operation(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            service: service.into(),
            operation: operation.into(),
        }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
