//! Grid bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use nodegrid_config::{Config, ConfigError, SocketPreparationError};

use crate::grid::{Grid, GridSettings};
use crate::health::HealthReporter;
use crate::node::CommandExecutor;
use crate::telemetry::{self, TelemetryError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the grid configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no configuration can be produced.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that always yields the configuration it was built with.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Loader that always yields `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Loader failure.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {source}")]
    Validation {
        /// Offending value.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Subscriber failure.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare listen socket: {source}")]
    Socket {
        /// Filesystem failure.
        #[source]
        source: SocketPreparationError,
    },
}

/// Builds a grid from loaded configuration.
///
/// Loads and validates configuration, initialises telemetry, prepares the
/// listen socket's directory and builds a grid with default collaborators
/// around `executor`. Every stage is reported to `reporter`.
///
/// # Errors
///
/// Returns the [`BootstrapError`] of the first stage that fails.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Grid, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => return Err(fail(&*reporter, BootstrapError::Configuration { source })),
    };

    if let Err(source) = config.validate() {
        return Err(fail(&*reporter, BootstrapError::Validation { source }));
    }

    if let Err(source) = telemetry::initialise(&config) {
        return Err(fail(&*reporter, BootstrapError::Telemetry { source }));
    }

    if let Err(source) = config.listen_socket().prepare_filesystem() {
        return Err(fail(&*reporter, BootstrapError::Socket { source }));
    }

    let grid = Grid::builder(GridSettings::from_config(&config), executor)
        .reporter(Arc::clone(&reporter))
        .build();
    reporter.bootstrap_succeeded(&config);
    Ok(grid)
}

fn fail(reporter: &dyn HealthReporter, error: BootstrapError) -> BootstrapError {
    reporter.bootstrap_failed(&error);
    error
}
