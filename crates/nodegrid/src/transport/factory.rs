//! Named transports: acceptor and connector factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nodegrid_config::SocketEndpoint;

use super::{
    Channel, ConnectionError, ConnectionHandler, ListenerError, ListenerHandle, SocketChannel,
    SocketListener,
};

/// Name of the built-in socket transport.
pub const SOCKET_TRANSPORT: &str = "socket";

/// Opens listening endpoints for a transport.
pub trait AcceptorFactory: Send + Sync {
    /// Binds `endpoint` and serves every accepted connection with `handler`.
    fn open(
        &self,
        endpoint: &SocketEndpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError>;
}

/// Opens outbound channels for a transport.
pub trait ConnectorFactory: Send + Sync {
    /// Connects to `endpoint`.
    fn connect(&self, endpoint: &SocketEndpoint) -> Result<Box<dyn Channel>, ConnectionError>;
}

/// Acceptor backed by [`SocketListener`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketAcceptorFactory;

impl AcceptorFactory for SocketAcceptorFactory {
    fn open(
        &self,
        endpoint: &SocketEndpoint,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<ListenerHandle, ListenerError> {
        SocketListener::bind(endpoint)?.start(handler)
    }
}

/// Connector backed by [`SocketChannel`].
#[derive(Debug, Clone, Copy)]
pub struct SocketConnectorFactory {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl SocketConnectorFactory {
    /// Creates a connector with the given timeouts.
    #[must_use]
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

impl ConnectorFactory for SocketConnectorFactory {
    fn connect(&self, endpoint: &SocketEndpoint) -> Result<Box<dyn Channel>, ConnectionError> {
        let channel = SocketChannel::open(endpoint, self.connect_timeout, self.read_timeout)?;
        Ok(Box::new(channel))
    }
}

#[derive(Clone)]
struct Transport {
    acceptor: Arc<dyn AcceptorFactory>,
    connector: Arc<dyn ConnectorFactory>,
}

/// Transports available to a grid, keyed by name.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<String, Transport>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the socket transport.
    #[must_use]
    pub fn with_socket(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self::new().register(
            SOCKET_TRANSPORT,
            Arc::new(SocketAcceptorFactory),
            Arc::new(SocketConnectorFactory::new(connect_timeout, read_timeout)),
        )
    }

    /// Adds or replaces a transport.
    #[must_use]
    pub fn register(
        mut self,
        name: impl Into<String>,
        acceptor: Arc<dyn AcceptorFactory>,
        connector: Arc<dyn ConnectorFactory>,
    ) -> Self {
        self.transports
            .insert(name.into(), Transport { acceptor, connector });
        self
    }

    /// Acceptor registered under `name`.
    #[must_use]
    pub fn acceptor(&self, name: &str) -> Option<Arc<dyn AcceptorFactory>> {
        self.transports
            .get(name)
            .map(|transport| Arc::clone(&transport.acceptor))
    }

    /// Connector registered under `name`.
    #[must_use]
    pub fn connector(&self, name: &str) -> Option<Arc<dyn ConnectorFactory>> {
        self.transports
            .get(name)
            .map(|transport| Arc::clone(&transport.connector))
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.transports.contains_key(name)
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.transports.keys().collect();
        names.sort();
        formatter
            .debug_struct("TransportRegistry")
            .field("transports", &names)
            .finish()
    }
}
