//! Seam between the node and the command-execution layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::ExecutionNode;
use crate::capability::Capability;
use crate::context::{ContextValue, SessionRef};
use crate::protocol::Conversation;

/// Opaque command forwarded to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Command name understood by the executor.
    pub name: String,
    /// Command arguments.
    #[serde(default)]
    pub arguments: Value,
}

impl CommandPayload {
    /// Creates a command.
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Failure raised by a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("command '{command}' failed: {message}")]
pub struct CommandError {
    /// Name of the failing command.
    pub command: String,
    /// What went wrong.
    pub message: String,
}

impl CommandError {
    /// Creates a command failure.
    pub fn new(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Runs commands against a node's state.
///
/// Implementations own the command semantics; the node only supplies the
/// resolution context and forwards the result unchanged.
pub trait CommandExecutor: Send + Sync {
    /// Executes `command` and returns its result, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] when the command fails.
    fn execute(
        &self,
        command: &CommandPayload,
        context: &mut ResolutionContext<'_>,
    ) -> Result<Option<Value>, CommandError>;
}

/// Per-call view over a node used while a command runs.
///
/// Lookups consult the call's own bindings first, then the node. The
/// context is seeded with an empty result slot named after the call's
/// conversation.
pub struct ResolutionContext<'a> {
    node: &'a ExecutionNode,
    conversation: &'a Conversation,
    result_slot: String,
    session: Option<SessionRef>,
    bindings: HashMap<String, ContextValue>,
}

impl<'a> ResolutionContext<'a> {
    pub(crate) fn new(
        node: &'a ExecutionNode,
        conversation: &'a Conversation,
        session: Option<SessionRef>,
    ) -> Self {
        let result_slot = conversation.result_slot();
        let mut bindings = HashMap::new();
        bindings.insert(result_slot.clone(), ContextValue::data(Value::Null));
        Self {
            node,
            conversation,
            result_slot,
            session,
            bindings,
        }
    }

    /// Node the command runs on.
    #[must_use]
    pub fn node(&self) -> &ExecutionNode {
        self.node
    }

    /// Conversation the command was sent in.
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        self.conversation
    }

    /// Session addressed by the request, when it resolved.
    #[must_use]
    pub fn session(&self) -> Option<&SessionRef> {
        self.session.as_ref()
    }

    /// Name of this call's result slot.
    #[must_use]
    pub fn result_slot(&self) -> &str {
        &self.result_slot
    }

    /// Resolves `identifier` against this call's bindings, then the node.
    #[must_use]
    pub fn resolve(&self, identifier: &str, expected: &Capability) -> Option<ContextValue> {
        self.bindings
            .get(identifier)
            .cloned()
            .or_else(|| self.node.get(identifier, expected))
    }

    /// Binds `identifier` for the rest of this call only.
    pub fn bind(&mut self, identifier: impl Into<String>, value: ContextValue) {
        self.bindings.insert(identifier.into(), value);
    }

    /// Stores the call's result in its slot.
    pub fn set_result(&mut self, value: Value) {
        self.bindings
            .insert(self.result_slot.clone(), ContextValue::data(value));
    }

    /// Value stored in the result slot, if one was set.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.bindings
            .get(&self.result_slot)
            .and_then(ContextValue::as_data)
            .filter(|value| !value.is_null())
    }
}
