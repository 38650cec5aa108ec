//! Serves a directory as a router recipient.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::{DIRECTORY_TARGET, Directory, DirectoryError, DirectoryOperation};
use crate::protocol::{Failure, FailureClass, MessageEnvelope, Response};
use crate::router::MessageHandler;

/// Answers [`DirectoryOperation`]s against a backing directory.
pub struct DirectoryHandler {
    directory: Arc<dyn Directory>,
}

impl DirectoryHandler {
    /// Wraps `directory`.
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    fn apply(&self, operation: DirectoryOperation) -> Result<Option<Value>, Failure> {
        let directory = self.directory.as_ref();
        match operation {
            DirectoryOperation::Create {
                id,
                service_interface,
                implementation,
            } => directory
                .create(&id, service_interface, implementation)
                .map_err(to_failure)
                .and_then(|descriptor| encode(&descriptor))
                .map(Some),
            DirectoryOperation::Lookup { id } => directory
                .lookup(&id)
                .map_err(to_failure)?
                .map(|descriptor| encode(&descriptor))
                .transpose(),
            DirectoryOperation::Remove { id } => directory
                .remove(&id)
                .map(|removed| Some(Value::Bool(removed)))
                .map_err(to_failure),
            DirectoryOperation::BindAddress {
                id,
                transport,
                endpoint,
            } => directory
                .bind_address(&id, &transport, endpoint)
                .map_err(to_failure)
                .and_then(|descriptor| encode(&descriptor))
                .map(Some),
        }
    }
}

impl MessageHandler for DirectoryHandler {
    fn on_message(&self, envelope: &MessageEnvelope) -> Response {
        let conversation = envelope.conversation();
        let result = DirectoryOperation::parse(&envelope.payload)
            .map_err(|error| error.to_failure())
            .and_then(|operation| self.apply(operation));
        match result {
            Ok(value) => Response::value(&conversation, value),
            Err(failure) => {
                warn!(
                    target: DIRECTORY_TARGET,
                    operation = envelope.payload.operation(),
                    failure = %failure,
                    "directory request failed"
                );
                Response::failure(&conversation, failure)
            }
        }
    }
}

fn to_failure(error: DirectoryError) -> Failure {
    error.to_failure()
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, Failure> {
    serde_json::to_value(value).map_err(|error| Failure::new(FailureClass::Internal, error.to_string()))
}
