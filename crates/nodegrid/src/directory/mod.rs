//! Directory service: id → service descriptor.
//!
//! A descriptor records what a service is (its interface and implementation
//! tags) and where it can be reached, one address per transport. The grid
//! consults the directory before creating a node and when routing a
//! connection.

mod handler;
mod memory;
mod operation;
mod remote;

use std::collections::BTreeMap;

use nodegrid_config::SocketEndpoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::handler::DirectoryHandler;
pub use self::memory::InMemoryDirectory;
pub use self::operation::DirectoryOperation;
pub use self::remote::RemoteDirectory;

use crate::capability::Capability;
use crate::protocol::{Failure, FailureClass};
use crate::transport::ConnectionError;

pub(crate) const DIRECTORY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::directory");

/// Recipient id a directory is served under.
pub const DIRECTORY_RECIPIENT: &str = "directory";

/// Where and what a service is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Service id, unique within the directory.
    pub id: String,
    /// Capability the service is reachable as.
    pub service_interface: Capability,
    /// Concrete implementation tag.
    pub implementation: Capability,
    /// Address per transport name.
    #[serde(default)]
    pub addresses: BTreeMap<String, SocketEndpoint>,
}

impl ServiceDescriptor {
    /// Creates a descriptor with no addresses.
    pub fn new(id: impl Into<String>, service_interface: Capability, implementation: Capability) -> Self {
        Self {
            id: id.into(),
            service_interface,
            implementation,
            addresses: BTreeMap::new(),
        }
    }

    /// Address bound for `transport`.
    #[must_use]
    pub fn address(&self, transport: &str) -> Option<&SocketEndpoint> {
        self.addresses.get(transport)
    }

    /// Adds or replaces the address for `transport`.
    #[must_use]
    pub fn with_address(mut self, transport: impl Into<String>, endpoint: SocketEndpoint) -> Self {
        self.addresses.insert(transport.into(), endpoint);
        self
    }
}

/// Errors surfaced by directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// A descriptor already exists under the id.
    #[error("service '{id}' already exists")]
    AlreadyExists {
        /// Service id.
        id: String,
    },
    /// No descriptor exists under the id.
    #[error("service '{id}' not found")]
    NotFound {
        /// Service id.
        id: String,
    },
    /// A remote directory failed for a reason with no typed variant.
    #[error("directory rejected the request: {0}")]
    Remote(#[source] Failure),
    /// A remote directory answered with an unexpected payload.
    #[error("unexpected directory reply: {message}")]
    InvalidReply {
        /// What was wrong with it.
        message: String,
    },
    /// The connection to a remote directory failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl DirectoryError {
    /// Converts the error into its wire form.
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        let class = match self {
            Self::AlreadyExists { .. } => FailureClass::Conflict,
            Self::NotFound { .. } => FailureClass::NotFound,
            Self::Remote(failure) => failure.class,
            Self::InvalidReply { .. } | Self::Connection(_) => FailureClass::Internal,
        };
        Failure::new(class, self.to_string())
    }

    /// Rebuilds a typed error from a wire failure about `id`.
    pub(crate) fn from_failure(id: &str, failure: Failure) -> Self {
        match failure.class {
            FailureClass::Conflict => Self::AlreadyExists { id: id.to_owned() },
            FailureClass::NotFound => Self::NotFound { id: id.to_owned() },
            _ => Self::Remote(failure),
        }
    }
}

/// Registry of service descriptors.
///
/// Operations on distinct ids are independent; operations on one id are
/// linearizable.
pub trait Directory: Send + Sync {
    /// Creates a descriptor for `id` with no addresses.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::AlreadyExists` when `id` is taken.
    fn create(
        &self,
        id: &str,
        service_interface: Capability,
        implementation: Capability,
    ) -> Result<ServiceDescriptor, DirectoryError>;

    /// Returns the descriptor for `id`, if any.
    ///
    /// # Errors
    ///
    /// Only remote directories fail, when the directory is unreachable.
    fn lookup(&self, id: &str) -> Result<Option<ServiceDescriptor>, DirectoryError>;

    /// Deletes the descriptor for `id`. Returns `false` when it was absent.
    ///
    /// # Errors
    ///
    /// Only remote directories fail, when the directory is unreachable.
    fn remove(&self, id: &str) -> Result<bool, DirectoryError>;

    /// Records `endpoint` as the address of `id` for `transport`, replacing
    /// any previous one.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::NotFound` when `id` has no descriptor.
    fn bind_address(
        &self,
        id: &str,
        transport: &str,
        endpoint: SocketEndpoint,
    ) -> Result<ServiceDescriptor, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn descriptor_wire_form_keys_addresses_by_transport() {
        let descriptor = ServiceDescriptor::new("n1", Capability::EXECUTION_NODE, Capability::new("impl"))
            .with_address("socket", SocketEndpoint::tcp("127.0.0.1", 7411));
        let encoded = serde_json::to_value(&descriptor).expect("encode");

        assert_eq!(encoded["service_interface"], "execution-node");
        assert_eq!(encoded["addresses"]["socket"]["transport"], "tcp");
        assert_eq!(encoded["addresses"]["socket"]["port"], 7411);
    }

    #[rstest]
    #[case::conflict(DirectoryError::AlreadyExists { id: String::from("n1") })]
    #[case::missing(DirectoryError::NotFound { id: String::from("n1") })]
    fn typed_errors_survive_the_wire(#[case] error: DirectoryError) {
        let rebuilt = DirectoryError::from_failure("n1", error.to_failure());
        assert_eq!(rebuilt.to_string(), error.to_string());
    }
}
