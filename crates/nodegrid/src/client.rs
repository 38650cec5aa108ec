//! Typed client for one execution node.

use serde_json::Value;
use tracing::debug;

use crate::connection::Connection;
use crate::grid::GridError;
use crate::node::{CommandPayload, NodeOperation};
use crate::protocol::{MessageSession, Response};

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Issues node operations over a [`Connection`].
///
/// Every request carries the client's session id and the next sequence
/// number, so replies can be matched to requests.
#[derive(Debug)]
pub struct NodeClient {
    node_id: String,
    connection: Connection,
    session: MessageSession,
}

impl NodeClient {
    /// Creates a client for `node_id` with a fresh message session.
    pub fn new(node_id: impl Into<String>, connection: Connection) -> Self {
        Self::with_session(node_id, connection, MessageSession::new())
    }

    /// Creates a client that numbers its requests from `session`.
    pub fn with_session(
        node_id: impl Into<String>,
        connection: Connection,
        session: MessageSession,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            connection,
            session,
        }
    }

    /// Id of the node this client addresses.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Session numbering this client's envelopes.
    #[must_use]
    pub fn session(&self) -> &MessageSession {
        &self.session
    }

    /// Returns `true` when requests bypass the transport.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.connection.is_local()
    }

    /// Runs `command`, against the session bound to `instance_id` when given.
    ///
    /// # Errors
    ///
    /// Returns `GridError::Remote` carrying the node's failure, or a
    /// connection error.
    pub fn execute(
        &mut self,
        command: CommandPayload,
        instance_id: Option<&str>,
    ) -> Result<Option<Value>, GridError> {
        let operation = NodeOperation::execute(command, instance_id.map(str::to_owned));
        self.call(&operation)
    }

    /// Records that `logical_name` refers to `instance_id`.
    ///
    /// # Errors
    ///
    /// As for [`NodeClient::execute`].
    pub fn register_ksession(&mut self, logical_name: &str, instance_id: &str) -> Result<(), GridError> {
        self.call(&NodeOperation::register_ksession(logical_name, instance_id))
            .map(|_| ())
    }

    /// Resolves `session_id` to an instance id.
    ///
    /// # Errors
    ///
    /// As for [`NodeClient::execute`]; also `GridError::UnexpectedResponse`
    /// when the reply is not text.
    pub fn lookup_ksession(&mut self, session_id: &str) -> Result<Option<String>, GridError> {
        let reply = self.call(&NodeOperation::lookup_ksession(session_id))?;
        text_reply(reply)
    }

    /// Resolves `session_id` through the `lookupKsessionId` operation.
    ///
    /// # Errors
    ///
    /// As for [`NodeClient::lookup_ksession`].
    pub fn lookup_ksession_id(&mut self, session_id: &str) -> Result<Option<String>, GridError> {
        let reply = self.call(&NodeOperation::lookup_ksession_id(session_id))?;
        text_reply(reply)
    }

    /// Sends `operation` without waiting for the node's reply.
    ///
    /// # Errors
    ///
    /// Returns a connection error when the envelope cannot be handed off.
    pub fn send(&mut self, operation: &NodeOperation) -> Result<(), GridError> {
        let envelope = self.session.one_way(self.node_id.clone(), operation.to_request());
        self.connection.write(&envelope)?;
        Ok(())
    }

    /// Sends `operation` and returns the raw reply.
    ///
    /// # Errors
    ///
    /// Returns a connection error; node failures stay inside the
    /// [`Response`].
    pub fn request(&mut self, operation: &NodeOperation) -> Result<Response, GridError> {
        let envelope = self.session.envelope(self.node_id.clone(), operation.to_request());
        debug!(
            target: CLIENT_TARGET,
            node = %self.node_id,
            operation = operation.name(),
            sequence = envelope.sequence,
            local = self.connection.is_local(),
            "node request"
        );
        Ok(self.connection.write(&envelope)?)
    }

    fn call(&mut self, operation: &NodeOperation) -> Result<Option<Value>, GridError> {
        Ok(self.request(operation)?.into_result()?)
    }
}

fn text_reply(reply: Option<Value>) -> Result<Option<String>, GridError> {
    match reply {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => Err(GridError::unexpected(format!("expected text, got {other}"))),
    }
}
