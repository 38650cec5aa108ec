//! Replies correlated with their request.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{Conversation, DispatchError};

/// Coarse classification of a failure, stable across transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The addressed entity does not exist.
    NotFound,
    /// The addressed entity already exists.
    Conflict,
    /// The message could not be routed or understood.
    Protocol,
    /// The command ran and failed.
    Command,
    /// The receiver failed for reasons unrelated to the request.
    Internal,
}

impl FailureClass {
    /// Wire name of the class.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Protocol => "protocol",
            Self::Command => "command",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A failure reported in place of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{class} failure: {message}")]
pub struct Failure {
    /// Failure classification.
    pub class: FailureClass,
    /// Human-readable detail.
    pub message: String,
}

impl Failure {
    /// Creates a failure.
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// Result carried by a [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The operation completed; `None` means it produced nothing.
    Value {
        /// Result value.
        #[serde(default)]
        value: Option<Value>,
    },
    /// The operation failed.
    Failure(Failure),
}

/// Reply to a request-response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Conversation id copied from the request.
    pub session_id: String,
    /// Sequence copied from the request.
    pub sequence: u64,
    /// What happened.
    pub outcome: Outcome,
}

impl Response {
    /// Creates a value response.
    ///
    /// A JSON `null` is folded into `None` so a value reply reads the same
    /// after a trip through the wire.
    #[must_use]
    pub fn value(conversation: &Conversation, value: Option<Value>) -> Self {
        Self::with_outcome(
            conversation,
            Outcome::Value {
                value: value.filter(|value| !value.is_null()),
            },
        )
    }

    /// Creates the empty reply synthesised for one-way sends.
    #[must_use]
    pub fn accepted(conversation: &Conversation) -> Self {
        Self::value(conversation, None)
    }

    /// Creates a failure response.
    #[must_use]
    pub fn failure(conversation: &Conversation, failure: Failure) -> Self {
        Self::with_outcome(conversation, Outcome::Failure(failure))
    }

    /// Creates a response from a dispatch result.
    #[must_use]
    pub fn from_result(
        conversation: &Conversation,
        result: Result<Option<Value>, DispatchError>,
    ) -> Self {
        match result {
            Ok(value) => Self::value(conversation, value),
            Err(error) => Self::failure(conversation, error.to_failure()),
        }
    }

    /// Conversation coordinates of the reply.
    #[must_use]
    pub fn conversation(&self) -> Conversation {
        Conversation::new(self.session_id.clone(), self.sequence)
    }

    /// Returns `true` for failure outcomes.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failure(_))
    }

    /// Unwraps the outcome into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the carried [`Failure`] for failure outcomes.
    pub fn into_result(self) -> Result<Option<Value>, Failure> {
        match self.outcome {
            Outcome::Value { value } => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }

    fn with_outcome(conversation: &Conversation, outcome: Outcome) -> Self {
        Self {
            session_id: conversation.session_id.clone(),
            sequence: conversation.sequence,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_responses_serialise_with_kind_tag() {
        let response = Response::value(&Conversation::new("s1", 2), Some(json!("iid")));
        let encoded = serde_json::to_value(&response).expect("encode");
        assert_eq!(
            encoded,
            json!({
                "session_id": "s1",
                "sequence": 2,
                "outcome": {"kind": "value", "value": "iid"}
            })
        );
    }

    #[test]
    fn failure_responses_flatten_failure_fields() {
        let failure = Failure::new(FailureClass::Protocol, "unknown recipient: n9");
        let response = Response::failure(&Conversation::new("s1", 2), failure.clone());
        let encoded = serde_json::to_string(&response).expect("encode");
        assert!(encoded.contains(r#""kind":"failure""#));
        assert!(encoded.contains(r#""class":"protocol""#));

        let decoded: Response = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.into_result(), Err(failure));
    }

    #[test]
    fn null_values_fold_to_none() {
        let response = Response::value(&Conversation::new("s1", 1), Some(Value::Null));
        assert_eq!(response.into_result(), Ok(None));
    }
}
