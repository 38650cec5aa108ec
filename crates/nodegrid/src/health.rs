//! Structured health reporting for grid lifecycle events.

use std::sync::Arc;

use nodegrid_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once a node is hosted and registered.
    fn node_created(&self, id: &str);

    /// Invoked once a node has been stopped and deregistered.
    fn node_removed(&self, id: &str);

    /// Invoked when a router endpoint starts accepting connections.
    fn endpoint_opened(&self, endpoint: &SocketEndpoint);

    /// Invoked when a router endpoint is closed.
    fn endpoint_closed(&self, endpoint: &SocketEndpoint);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn node_created(&self, id: &str) {
        (**self).node_created(id);
    }

    fn node_removed(&self, id: &str) {
        (**self).node_removed(id);
    }

    fn endpoint_opened(&self, endpoint: &SocketEndpoint) {
        (**self).endpoint_opened(endpoint);
    }

    fn endpoint_closed(&self, endpoint: &SocketEndpoint) {
        (**self).endpoint_closed(endpoint);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting grid bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.listen_socket(),
            local_allowed = config.local_allowed(),
            eviction_ttl_millis = config.eviction_ttl_millis,
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "grid bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "grid bootstrap failed"
        );
    }

    fn node_created(&self, id: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "node_created",
            node = id,
            "execution node hosted"
        );
    }

    fn node_removed(&self, id: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "node_removed",
            node = id,
            "execution node removed"
        );
    }

    fn endpoint_opened(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "endpoint_opened",
            endpoint = %endpoint,
            "router endpoint opened"
        );
    }

    fn endpoint_closed(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "endpoint_closed",
            endpoint = %endpoint,
            "router endpoint closed"
        );
    }
}
