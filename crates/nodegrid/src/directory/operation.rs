//! Directory operations on the wire.

use nodegrid_config::SocketEndpoint;
use serde::Deserialize;
use serde_json::json;

use crate::capability::Capability;
use crate::protocol::{DispatchError, OperationRequest};

const DIRECTORY_SERVICE: &str = "directory";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateArgs {
    id: String,
    service_interface: Capability,
    implementation: Capability,
}

#[derive(Debug, Deserialize)]
struct IdArgs {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BindArgs {
    id: String,
    transport: String,
    endpoint: SocketEndpoint,
}

/// Closed set of directory operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOperation {
    /// Create a descriptor.
    Create {
        /// Service id.
        id: String,
        /// Kind of service.
        service_interface: Capability,
        /// Implementation tag.
        implementation: Capability,
    },
    /// Fetch a descriptor.
    Lookup {
        /// Service id.
        id: String,
    },
    /// Delete a descriptor.
    Remove {
        /// Service id.
        id: String,
    },
    /// Record the address a service listens on for one transport.
    BindAddress {
        /// Service id.
        id: String,
        /// Transport name.
        transport: String,
        /// Address on that transport.
        endpoint: SocketEndpoint,
    },
}

impl DirectoryOperation {
    const CREATE: &'static str = "create";
    const LOOKUP: &'static str = "lookup";
    const REMOVE: &'static str = "remove";
    const BIND_ADDRESS: &'static str = "bindAddress";

    /// Id of the service the operation concerns.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Create { id, .. }
            | Self::Lookup { id }
            | Self::Remove { id }
            | Self::BindAddress { id, .. } => id,
        }
    }

    /// Parses a wire request.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownOperation` for names outside the set and
    /// `DispatchError::InvalidArguments` when arguments do not decode.
    pub fn parse(request: &OperationRequest) -> Result<Self, DispatchError> {
        match request.operation() {
            Self::CREATE => {
                let args: CreateArgs = request.decode_arguments()?;
                Ok(Self::Create {
                    id: args.id,
                    service_interface: args.service_interface,
                    implementation: args.implementation,
                })
            }
            Self::LOOKUP => {
                let IdArgs { id } = request.decode_arguments()?;
                Ok(Self::Lookup { id })
            }
            Self::REMOVE => {
                let IdArgs { id } = request.decode_arguments()?;
                Ok(Self::Remove { id })
            }
            Self::BIND_ADDRESS => {
                let args: BindArgs = request.decode_arguments()?;
                Ok(Self::BindAddress {
                    id: args.id,
                    transport: args.transport,
                    endpoint: args.endpoint,
                })
            }
            other => Err(DispatchError::unknown_operation(DIRECTORY_SERVICE, other)),
        }
    }

    /// Encodes the operation for the wire.
    #[must_use]
    pub fn to_request(&self) -> OperationRequest {
        match self {
            Self::Create {
                id,
                service_interface,
                implementation,
            } => OperationRequest::new(
                Self::CREATE,
                json!({
                    "id": id,
                    "serviceInterface": service_interface,
                    "implementation": implementation,
                }),
            ),
            Self::Lookup { id } => OperationRequest::new(Self::LOOKUP, json!({ "id": id })),
            Self::Remove { id } => OperationRequest::new(Self::REMOVE, json!({ "id": id })),
            Self::BindAddress {
                id,
                transport,
                endpoint,
            } => OperationRequest::new(
                Self::BIND_ADDRESS,
                json!({
                    "id": id,
                    "transport": transport,
                    "endpoint": endpoint,
                }),
            ),
        }
    }
}
