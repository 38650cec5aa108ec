//! The grid: hosts execution nodes and connects callers to them.
//!
//! A [`Grid`] owns the nodes created through it, the routers exposing them
//! and a [`ConnectionFactory`] that turns directory descriptors into
//! connections. All collaborators arrive through [`GridServices`] when the
//! grid is built, so there is no process-wide state.

mod builder;
mod errors;
mod registry;

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nodegrid_config::SocketEndpoint;
use tracing::{debug, info, warn};

pub use self::builder::{
    GridBuilder, GridServices, GridSettings, default_capabilities, default_directory,
    default_reporter, default_transports,
};
pub use self::errors::GridError;
pub use self::registry::NodeRegistry;

use crate::capability::Capability;
use crate::client::NodeClient;
use crate::connection::{Connection, ConnectionFactory};
use crate::directory::{
    DIRECTORY_RECIPIENT, Directory, DirectoryError, DirectoryHandler, ServiceDescriptor,
};
use crate::node::{CommandExecutor, ExecutionNode, NODE_IMPLEMENTATION};
use crate::router::{MessageHandler, MultiplexRouter, Release};

const GRID_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::grid");

/// Hosts execution nodes and routes connections to them.
pub struct Grid {
    settings: GridSettings,
    services: GridServices,
    nodes: Arc<NodeRegistry>,
    connections: ConnectionFactory,
    routers: Mutex<Vec<Arc<MultiplexRouter>>>,
}

impl Grid {
    /// Starts a [`GridBuilder`].
    #[must_use]
    pub fn builder(settings: GridSettings, executor: Arc<dyn CommandExecutor>) -> GridBuilder {
        GridBuilder::new(settings, executor)
    }

    pub(crate) fn new(settings: GridSettings, services: GridServices) -> Self {
        let nodes = Arc::new(NodeRegistry::new());
        let connections = ConnectionFactory::new(
            Arc::clone(&nodes),
            Arc::clone(&services.transports),
            settings.local_allowed,
        );
        Self {
            settings,
            services,
            nodes,
            connections,
            routers: Mutex::new(Vec::new()),
        }
    }

    /// Settings the grid was built with.
    #[must_use]
    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    /// Directory this grid registers its nodes in.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.services.directory
    }

    /// Factory used by [`Grid::connect`].
    #[must_use]
    pub fn connections(&self) -> &ConnectionFactory {
        &self.connections
    }

    /// Hosts a new node under `id`.
    ///
    /// A descriptor tagged `execution-node` is created when the directory has
    /// none; an existing one is reused. The node's eviction job is running
    /// when this returns.
    ///
    /// # Errors
    ///
    /// Returns `GridError::NodeAlreadyHosted` when this grid already hosts
    /// `id`, `GridError::CapabilityMismatch` when the directory describes
    /// `id` as some other kind of service, and directory or eviction errors.
    pub fn create_node(&self, id: &str) -> Result<Arc<ExecutionNode>, GridError> {
        if self.nodes.contains(id) {
            return Err(GridError::NodeAlreadyHosted { id: id.to_owned() });
        }
        self.ensure_descriptor(id)?;

        let node = Arc::new(ExecutionNode::new(
            id,
            Arc::clone(&self.services.executor),
            Arc::clone(&self.services.capabilities),
        ));
        node.start_eviction(self.settings.eviction_ttl, self.settings.eviction_interval)?;
        if let Err(error) = self.nodes.insert(Arc::clone(&node)) {
            node.shutdown();
            return Err(error);
        }
        info!(target: GRID_TARGET, node = id, "node created");
        self.services.reporter.node_created(id);
        Ok(node)
    }

    /// Locally hosted node `id`.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<Arc<ExecutionNode>> {
        self.nodes.get(id)
    }

    /// Ids of locally hosted nodes, sorted.
    #[must_use]
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.ids()
    }

    /// Stops node `id` and forgets it.
    ///
    /// The node is withdrawn from every router (endpoints left without
    /// recipients are closed) and its directory entry is removed.
    ///
    /// # Errors
    ///
    /// Returns `GridError::NodeNotFound` when `id` is not hosted here, or the
    /// directory's error when the entry cannot be removed.
    pub fn remove_node(&self, id: &str) -> Result<(), GridError> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GridError::NodeNotFound { id: id.to_owned() })?;
        node.shutdown();
        self.withdraw(id);
        self.services.directory.remove(id)?;
        info!(target: GRID_TARGET, node = id, "node removed");
        self.services.reporter.node_removed(id);
        Ok(())
    }

    /// Serves node `id` on `endpoint` and records the address under
    /// `transport` in the directory.
    ///
    /// Nodes exposed on the same endpoint share one router. Returns the
    /// bound endpoint, which differs from `endpoint` when an ephemeral TCP
    /// port was requested.
    ///
    /// # Errors
    ///
    /// Returns `GridError::NodeNotFound` when `id` is not hosted here,
    /// `GridError::UnsupportedTransport` when `transport` has no acceptor,
    /// and listener, router or directory errors.
    pub fn expose_node(
        &self,
        id: &str,
        transport: &str,
        endpoint: &SocketEndpoint,
    ) -> Result<SocketEndpoint, GridError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| GridError::NodeNotFound { id: id.to_owned() })?;
        let bound = self.serve(id, node, transport, endpoint)?;
        if let Err(error) = self
            .services
            .directory
            .bind_address(id, transport, bound.clone())
        {
            self.withdraw(id);
            return Err(error.into());
        }
        Ok(bound)
    }

    /// Serves this grid's directory on `endpoint` under the `directory`
    /// recipient id, so other grids can share it through a
    /// [`RemoteDirectory`](crate::directory::RemoteDirectory).
    ///
    /// # Errors
    ///
    /// Returns `GridError::UnsupportedTransport` when `transport` has no
    /// acceptor, and listener or router errors.
    pub fn expose_directory(
        &self,
        transport: &str,
        endpoint: &SocketEndpoint,
    ) -> Result<SocketEndpoint, GridError> {
        let handler = Arc::new(DirectoryHandler::new(Arc::clone(&self.services.directory)));
        self.serve(DIRECTORY_RECIPIENT, handler, transport, endpoint)
    }

    /// Endpoints currently served by this grid.
    #[must_use]
    pub fn endpoints(&self) -> Vec<SocketEndpoint> {
        self.routers()
            .iter()
            .filter_map(|router| router.endpoint())
            .collect()
    }

    /// Descriptor registered for `id`.
    ///
    /// # Errors
    ///
    /// Returns the directory's error when it cannot be reached.
    pub fn lookup(&self, id: &str) -> Result<Option<ServiceDescriptor>, GridError> {
        Ok(self.services.directory.lookup(id)?)
    }

    /// Opens a connection to service `id`.
    ///
    /// # Errors
    ///
    /// Returns `GridError::ServiceNotFound` when the directory has no
    /// descriptor for `id`, and connection errors when it cannot be reached.
    pub fn connect(&self, id: &str) -> Result<Connection, GridError> {
        let descriptor = self
            .lookup(id)?
            .ok_or_else(|| GridError::ServiceNotFound { id: id.to_owned() })?;
        Ok(self.connections.create_connection(&descriptor)?)
    }

    /// Opens a typed client for node `id`.
    ///
    /// # Errors
    ///
    /// As for [`Grid::connect`].
    pub fn client(&self, id: &str) -> Result<NodeClient, GridError> {
        Ok(NodeClient::new(id, self.connect(id)?))
    }

    /// Removes every hosted node and closes every endpoint.
    ///
    /// Failures are logged; the grid is left empty either way.
    pub fn shutdown(&self) {
        for id in self.nodes.ids() {
            if let Err(error) = self.remove_node(&id) {
                warn!(target: GRID_TARGET, node = %id, error = %error, "node removal failed during shutdown");
            }
        }
        let routers = mem::take(&mut *self.routers());
        for router in routers {
            let endpoint = router.endpoint();
            if let Err(error) = router.close() {
                warn!(target: GRID_TARGET, error = %error, "router did not close cleanly");
            }
            if let Some(endpoint) = endpoint {
                self.services.reporter.endpoint_closed(&endpoint);
            }
        }
    }

    fn ensure_descriptor(&self, id: &str) -> Result<ServiceDescriptor, GridError> {
        let directory = &self.services.directory;
        let descriptor = match directory.lookup(id)? {
            Some(descriptor) => descriptor,
            None => match directory.create(id, Capability::EXECUTION_NODE, NODE_IMPLEMENTATION) {
                Ok(descriptor) => descriptor,
                Err(DirectoryError::AlreadyExists { .. }) => {
                    debug!(target: GRID_TARGET, node = id, "descriptor created concurrently");
                    directory
                        .lookup(id)?
                        .ok_or_else(|| GridError::ServiceNotFound { id: id.to_owned() })?
                }
                Err(error) => return Err(error.into()),
            },
        };
        if descriptor.service_interface != Capability::EXECUTION_NODE {
            return Err(GridError::CapabilityMismatch {
                id: id.to_owned(),
                expected: Capability::EXECUTION_NODE,
                found: descriptor.service_interface,
            });
        }
        Ok(descriptor)
    }

    fn serve(
        &self,
        id: &str,
        handler: Arc<dyn MessageHandler>,
        transport: &str,
        endpoint: &SocketEndpoint,
    ) -> Result<SocketEndpoint, GridError> {
        let mut routers = self.routers();
        if !endpoint.is_ephemeral()
            && let Some(router) = routers
                .iter()
                .find(|router| router.endpoint().as_ref() == Some(endpoint))
        {
            router.register(id, handler)?;
            return Ok(endpoint.clone());
        }

        let acceptor = self.services.transports.acceptor(transport).ok_or_else(|| {
            GridError::UnsupportedTransport {
                transport: transport.to_owned(),
            }
        })?;
        let router = Arc::new(MultiplexRouter::new());
        router.register(id, handler)?;
        let handle = acceptor.open(endpoint, router.connection_handler())?;
        let bound = handle.endpoint().clone();
        router.attach(handle)?;
        self.services.reporter.endpoint_opened(&bound);
        routers.push(router);
        Ok(bound)
    }

    fn withdraw(&self, id: &str) {
        let reporter = &self.services.reporter;
        self.routers().retain(|router| {
            let endpoint = router.endpoint();
            match router.unregister(id) {
                Release::Closed => {
                    if let Some(endpoint) = endpoint {
                        reporter.endpoint_closed(&endpoint);
                    }
                    false
                }
                Release::Absent | Release::Retained { .. } => true,
            }
        });
    }

    fn routers(&self) -> MutexGuard<'_, Vec<Arc<MultiplexRouter>>> {
        self.routers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Grid")
            .field("settings", &self.settings)
            .field("nodes", &self.nodes.ids())
            .field("endpoints", &self.endpoints())
            .finish_non_exhaustive()
    }
}

impl Drop for Grid {
    fn drop(&mut self) {
        self.shutdown();
    }
}
