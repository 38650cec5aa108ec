//! Route selection and connection construction.

use std::sync::Arc;

use nodegrid_config::SocketEndpoint;
use tracing::debug;

use super::{CONNECTION_TARGET, Connection, LocalConnection, RemoteConnection};
use crate::directory::ServiceDescriptor;
use crate::grid::NodeRegistry;
use crate::node::ExecutionNode;
use crate::transport::{ConnectionError, TransportRegistry};

/// How a descriptor will be reached.
#[derive(Debug, Clone)]
pub enum Route {
    /// Call the locally hosted node directly.
    Local(Arc<ExecutionNode>),
    /// Connect over `transport` to `address`.
    Remote {
        /// Transport name.
        transport: String,
        /// Address on that transport.
        address: SocketEndpoint,
    },
    /// Neither a local instance nor a usable address exists.
    NoRoute,
}

/// Decides how to reach `descriptor`.
///
/// A locally hosted node wins when `local_allowed` is set. Otherwise the
/// first address, in transport-name order, whose transport is registered is
/// used.
#[must_use]
pub fn route(
    descriptor: &ServiceDescriptor,
    registry: &NodeRegistry,
    local_allowed: bool,
    transports: &TransportRegistry,
) -> Route {
    if local_allowed && let Some(node) = registry.get(&descriptor.id) {
        return Route::Local(node);
    }
    descriptor
        .addresses
        .iter()
        .find(|(transport, _)| transports.contains(transport))
        .map_or(Route::NoRoute, |(transport, address)| Route::Remote {
            transport: transport.clone(),
            address: address.clone(),
        })
}

/// Builds connections from directory descriptors.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    registry: Arc<NodeRegistry>,
    transports: Arc<TransportRegistry>,
    local_allowed: bool,
}

impl ConnectionFactory {
    /// Creates a factory over the given local registry and transports.
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        transports: Arc<TransportRegistry>,
        local_allowed: bool,
    ) -> Self {
        Self {
            registry,
            transports,
            local_allowed,
        }
    }

    /// Same factory with local shortcutting switched on or off.
    #[must_use]
    pub fn with_local_allowed(&self, local_allowed: bool) -> Self {
        Self {
            local_allowed,
            ..self.clone()
        }
    }

    /// Whether local shortcutting is enabled.
    #[must_use]
    pub fn local_allowed(&self) -> bool {
        self.local_allowed
    }

    /// Route this factory would take for `descriptor`.
    #[must_use]
    pub fn route(&self, descriptor: &ServiceDescriptor) -> Route {
        route(descriptor, &self.registry, self.local_allowed, &self.transports)
    }

    /// Opens a connection to `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::NoRoute` when the descriptor has neither a
    /// local instance nor a usable address, and the connector's error when
    /// the remote side cannot be reached.
    pub fn create_connection(&self, descriptor: &ServiceDescriptor) -> Result<Connection, ConnectionError> {
        match self.route(descriptor) {
            Route::Local(node) => {
                debug!(target: CONNECTION_TARGET, id = %descriptor.id, "local connection");
                Ok(Connection::Local(LocalConnection::new(descriptor.id.clone(), node)))
            }
            Route::Remote { transport, address } => {
                let connector = self
                    .transports
                    .connector(&transport)
                    .ok_or_else(|| ConnectionError::UnsupportedTransport {
                        transport: transport.clone(),
                    })?;
                let channel = connector.connect(&address)?;
                debug!(
                    target: CONNECTION_TARGET,
                    id = %descriptor.id,
                    transport = %transport,
                    address = %address,
                    "remote connection"
                );
                Ok(Connection::Remote(RemoteConnection::new(channel)))
            }
            Route::NoRoute => Err(ConnectionError::NoRoute {
                id: descriptor.id.clone(),
            }),
        }
    }
}
