//! Error types surfaced by the grid.

use thiserror::Error;

use crate::capability::Capability;
use crate::context::EvictionError;
use crate::directory::DirectoryError;
use crate::protocol::{Failure, FailureClass};
use crate::router::RouterError;
use crate::transport::{ConnectionError, ListenerError};

/// Errors surfaced by [`Grid`](super::Grid) operations and node clients.
#[derive(Debug, Error)]
pub enum GridError {
    /// A node with this id already runs on the grid.
    #[error("node '{id}' is already hosted here")]
    NodeAlreadyHosted {
        /// Node id.
        id: String,
    },
    /// No node with this id runs on the grid.
    #[error("node '{id}' is not hosted here")]
    NodeNotFound {
        /// Node id.
        id: String,
    },
    /// The directory holds no descriptor for the id.
    #[error("no service registered under '{id}'")]
    ServiceNotFound {
        /// Service id.
        id: String,
    },
    /// The descriptor under the id describes another kind of service.
    #[error("service '{id}' is a {found} service, expected {expected}")]
    CapabilityMismatch {
        /// Service id.
        id: String,
        /// Service interface the caller needs.
        expected: Capability,
        /// Service interface recorded in the directory.
        found: Capability,
    },
    /// No acceptor is installed for the transport.
    #[error("transport '{transport}' has no acceptor installed")]
    UnsupportedTransport {
        /// Transport name.
        transport: String,
    },
    /// A reply had an unexpected shape.
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// What was wrong with it.
        message: String,
    },
    /// Directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// Connection failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// Listener failure while exposing an endpoint.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// Router registration failure.
    #[error(transparent)]
    Router(#[from] RouterError),
    /// The node's eviction job did not start.
    #[error(transparent)]
    Eviction(#[from] EvictionError),
    /// The remote node answered with a failure.
    #[error(transparent)]
    Remote(#[from] Failure),
}

impl GridError {
    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }

    /// Returns `true` when resolving the service again may succeed.
    ///
    /// Missing services and transport failures qualify. Protocol and
    /// command failures do not: the same request would fail the same way.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceNotFound { .. } | Self::Connection(_) => true,
            Self::Directory(error) => matches!(
                error,
                DirectoryError::NotFound { .. } | DirectoryError::Connection(_)
            ),
            Self::Remote(failure) => failure.class == FailureClass::NotFound,
            _ => false,
        }
    }
}
