//! Values held in a node's session context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// A stateful session owned by the command-execution layer.
///
/// The grid never interprets sessions; commands recover the concrete type
/// through [`StatefulSession::as_any`].
pub trait StatefulSession: Any + Send + Sync + fmt::Debug {
    /// Upcasts to [`Any`] for downcasting by commands.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a stateful session.
pub type SessionRef = Arc<dyn StatefulSession>;

/// A value bound to an identifier in a session context.
#[derive(Debug, Clone)]
pub enum ContextValue {
    /// A stateful session; binding one mints an instance id.
    Session(SessionRef),
    /// Any other value.
    Data(Value),
}

impl ContextValue {
    /// Wraps a session.
    #[must_use]
    pub fn session(session: impl StatefulSession) -> Self {
        Self::Session(Arc::new(session))
    }

    /// Wraps a text value.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Data(Value::String(text.into()))
    }

    /// Wraps a JSON value.
    #[must_use]
    pub fn data(value: Value) -> Self {
        Self::Data(value)
    }

    /// Returns `true` for the stateful-session kind.
    #[must_use]
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Returns the session handle, if any.
    #[must_use]
    pub fn as_session(&self) -> Option<&SessionRef> {
        match self {
            Self::Session(session) => Some(session),
            Self::Data(_) => None,
        }
    }

    /// Returns the text payload, if the value is a JSON string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Data(Value::String(text)) => Some(text),
            _ => None,
        }
    }

    /// Returns the JSON payload, if the value is data.
    #[must_use]
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Session(_) => None,
        }
    }
}

/// Sessions compare by identity, data by value.
impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Session(left), Self::Session(right)) => {
                std::ptr::addr_eq(Arc::as_ptr(left), Arc::as_ptr(right))
            }
            (Self::Data(left), Self::Data(right)) => left == right,
            _ => false,
        }
    }
}
