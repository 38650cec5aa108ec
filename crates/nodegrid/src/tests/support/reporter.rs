//! Test double for [`HealthReporter`] that records lifecycle events for assertions.

use std::sync::Mutex;

use nodegrid_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    NodeCreated(String),
    NodeRemoved(String),
    EndpointOpened(SocketEndpoint),
    EndpointClosed(SocketEndpoint),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn node_created(&self, id: &str) {
        self.record(HealthEvent::NodeCreated(id.to_owned()));
    }

    fn node_removed(&self, id: &str) {
        self.record(HealthEvent::NodeRemoved(id.to_owned()));
    }

    fn endpoint_opened(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::EndpointOpened(endpoint.clone()));
    }

    fn endpoint_closed(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::EndpointClosed(endpoint.clone()));
    }
}
