//! Directory client speaking to a directory served by another router.

use std::sync::{Mutex, PoisonError};

use nodegrid_config::SocketEndpoint;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use super::{DIRECTORY_RECIPIENT, DIRECTORY_TARGET, Directory, DirectoryError, DirectoryOperation, ServiceDescriptor};
use crate::capability::Capability;
use crate::connection::Connection;
use crate::protocol::MessageSession;

/// [`Directory`] whose operations travel over a [`Connection`].
///
/// Requests are serialised on one connection; each call holds it only for
/// the duration of its round trip.
#[derive(Debug)]
pub struct RemoteDirectory {
    connection: Mutex<Connection>,
    session: MessageSession,
    recipient: String,
}

impl RemoteDirectory {
    /// Talks to the directory registered under [`DIRECTORY_RECIPIENT`].
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self::with_recipient(connection, DIRECTORY_RECIPIENT)
    }

    /// Talks to a directory registered under `recipient`.
    pub fn with_recipient(connection: Connection, recipient: impl Into<String>) -> Self {
        Self {
            connection: Mutex::new(connection),
            session: MessageSession::new(),
            recipient: recipient.into(),
        }
    }

    fn call(&self, operation: &DirectoryOperation) -> Result<Option<Value>, DirectoryError> {
        let envelope = self.session.envelope(self.recipient.clone(), operation.to_request());
        trace!(
            target: DIRECTORY_TARGET,
            id = operation.id(),
            operation = envelope.payload.operation(),
            "remote directory call"
        );
        let response = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(&envelope)?;
        response
            .into_result()
            .map_err(|failure| DirectoryError::from_failure(operation.id(), failure))
    }
}

impl Directory for RemoteDirectory {
    fn create(
        &self,
        id: &str,
        service_interface: Capability,
        implementation: Capability,
    ) -> Result<ServiceDescriptor, DirectoryError> {
        let reply = self.call(&DirectoryOperation::Create {
            id: id.to_owned(),
            service_interface,
            implementation,
        })?;
        required(reply)
    }

    fn lookup(&self, id: &str) -> Result<Option<ServiceDescriptor>, DirectoryError> {
        self.call(&DirectoryOperation::Lookup { id: id.to_owned() })?
            .map(decode)
            .transpose()
    }

    fn remove(&self, id: &str) -> Result<bool, DirectoryError> {
        let reply = self.call(&DirectoryOperation::Remove { id: id.to_owned() })?;
        required(reply)
    }

    fn bind_address(
        &self,
        id: &str,
        transport: &str,
        endpoint: SocketEndpoint,
    ) -> Result<ServiceDescriptor, DirectoryError> {
        let reply = self.call(&DirectoryOperation::BindAddress {
            id: id.to_owned(),
            transport: transport.to_owned(),
            endpoint,
        })?;
        required(reply)
    }
}

fn required<T: DeserializeOwned>(reply: Option<Value>) -> Result<T, DirectoryError> {
    reply.map_or_else(
        || {
            Err(DirectoryError::InvalidReply {
                message: String::from("reply carried no value"),
            })
        },
        decode,
    )
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, DirectoryError> {
    serde_json::from_value(value).map_err(|error| DirectoryError::InvalidReply {
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LocalConnection;
    use crate::directory::{DirectoryHandler, InMemoryDirectory};
    use rstest::{fixture, rstest};
    use std::sync::Arc;

    #[fixture]
    fn remote() -> RemoteDirectory {
        let handler = DirectoryHandler::new(Arc::new(InMemoryDirectory::new()));
        let connection = Connection::Local(LocalConnection::new(DIRECTORY_RECIPIENT, Arc::new(handler)));
        RemoteDirectory::new(connection)
    }

    #[rstest]
    fn operations_travel_as_envelopes(remote: RemoteDirectory) {
        let created = remote
            .create("n1", Capability::EXECUTION_NODE, Capability::new("impl"))
            .expect("create");
        let bound = remote
            .bind_address("n1", "socket", SocketEndpoint::tcp("127.0.0.1", 7411))
            .expect("bind");

        assert!(created.addresses.is_empty());
        assert_eq!(remote.lookup("n1").expect("lookup"), Some(bound));
        assert!(remote.remove("n1").expect("remove"));
        assert_eq!(remote.lookup("n1").expect("lookup"), None);
    }

    #[rstest]
    fn typed_failures_come_back_typed(remote: RemoteDirectory) {
        remote
            .create("n1", Capability::EXECUTION_NODE, Capability::new("impl"))
            .expect("create");

        let duplicate = remote
            .create("n1", Capability::EXECUTION_NODE, Capability::new("impl"))
            .expect_err("duplicate");
        let missing = remote
            .bind_address("ghost", "socket", SocketEndpoint::tcp("127.0.0.1", 1))
            .expect_err("missing");

        assert!(matches!(duplicate, DirectoryError::AlreadyExists { .. }));
        assert!(matches!(missing, DirectoryError::NotFound { .. }));
    }
}
