//! Grid assembly: settings, collaborators and their defaults.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nodegrid_config::{Config, SocketEndpoint};

use super::Grid;
use crate::capability::CapabilityRegistry;
use crate::directory::{Directory, InMemoryDirectory};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::node::CommandExecutor;
use crate::transport::TransportRegistry;

/// Runtime settings a grid is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSettings {
    /// Endpoint used when a node is exposed without one.
    pub listen_socket: SocketEndpoint,
    /// Whether connections to hosted nodes bypass the transport.
    pub local_allowed: bool,
    /// Lifetime of untouched evictable entries.
    pub eviction_ttl: Duration,
    /// Period of each node's eviction sweep.
    pub eviction_interval: Duration,
    /// Connect timeout of the default socket connector.
    pub connect_timeout: Duration,
    /// Response timeout of the default socket connector.
    pub read_timeout: Duration,
}

impl GridSettings {
    /// Extracts grid settings from a resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            listen_socket: config.listen_socket().clone(),
            local_allowed: config.local_allowed(),
            eviction_ttl: config.eviction_ttl(),
            eviction_interval: config.eviction_interval(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    /// Same settings with local shortcutting switched on or off.
    #[must_use]
    pub fn with_local_allowed(mut self, local_allowed: bool) -> Self {
        self.local_allowed = local_allowed;
        self
    }
}

impl Default for GridSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Collaborators a grid depends on.
#[derive(Clone)]
pub struct GridServices {
    /// Where nodes and endpoints are registered.
    pub directory: Arc<dyn Directory>,
    /// Acceptor and connector factories by transport name.
    pub transports: Arc<TransportRegistry>,
    /// Runs command payloads on every node.
    pub executor: Arc<dyn CommandExecutor>,
    /// Capability tags checked on node creation.
    pub capabilities: Arc<CapabilityRegistry>,
    /// Receives lifecycle events.
    pub reporter: Arc<dyn HealthReporter>,
}

/// Fresh in-process directory.
#[must_use]
pub fn default_directory() -> Arc<dyn Directory> {
    Arc::new(InMemoryDirectory::new())
}

/// Socket transport configured with the settings' timeouts.
#[must_use]
pub fn default_transports(settings: &GridSettings) -> Arc<TransportRegistry> {
    Arc::new(TransportRegistry::with_socket(
        settings.connect_timeout,
        settings.read_timeout,
    ))
}

/// Empty capability registry.
#[must_use]
pub fn default_capabilities() -> Arc<CapabilityRegistry> {
    Arc::new(CapabilityRegistry::new())
}

/// `tracing`-backed health reporter.
#[must_use]
pub fn default_reporter() -> Arc<dyn HealthReporter> {
    Arc::new(StructuredHealthReporter::new())
}

/// Builds a [`Grid`], filling unset collaborators from the defaults.
pub struct GridBuilder {
    settings: GridSettings,
    executor: Arc<dyn CommandExecutor>,
    directory: Option<Arc<dyn Directory>>,
    transports: Option<Arc<TransportRegistry>>,
    capabilities: Option<Arc<CapabilityRegistry>>,
    reporter: Option<Arc<dyn HealthReporter>>,
}

impl GridBuilder {
    /// Starts a builder. Only the command executor has no default.
    #[must_use]
    pub fn new(settings: GridSettings, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            settings,
            executor,
            directory: None,
            transports: None,
            capabilities: None,
            reporter: None,
        }
    }

    /// Shares `directory` instead of a private in-process one.
    #[must_use]
    pub fn directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Replaces the default socket transports.
    #[must_use]
    pub fn transports(mut self, transports: Arc<TransportRegistry>) -> Self {
        self.transports = Some(transports);
        self
    }

    /// Replaces the empty capability registry.
    #[must_use]
    pub fn capabilities(mut self, capabilities: Arc<CapabilityRegistry>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Replaces the tracing health reporter.
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Resolves the collaborators without building the grid.
    #[must_use]
    pub fn services(&self) -> GridServices {
        GridServices {
            directory: self.directory.clone().unwrap_or_else(default_directory),
            transports: self
                .transports
                .clone()
                .unwrap_or_else(|| default_transports(&self.settings)),
            executor: Arc::clone(&self.executor),
            capabilities: self.capabilities.clone().unwrap_or_else(default_capabilities),
            reporter: self.reporter.clone().unwrap_or_else(default_reporter),
        }
    }

    /// Builds the grid from the settings and resolved collaborators.
    #[must_use]
    pub fn build(self) -> Grid {
        let services = self.services();
        Grid::new(self.settings, services)
    }
}

impl fmt::Debug for GridServices {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GridServices")
            .field("transports", &self.transports)
            .field("capabilities", &self.capabilities.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for GridBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GridBuilder")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
