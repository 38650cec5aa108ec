//! Shared doubles and helpers for the grid test suites.

mod config_loader;
mod executor;
mod reporter;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nodegrid_config::SocketEndpoint;

pub use self::config_loader::{FailingConfigLoader, TempSocketConfigLoader};
pub use self::executor::{CounterSession, ScriptedExecutor, scripted_executor};
pub use self::reporter::{HealthEvent, RecordingHealthReporter};

use crate::grid::{Grid, GridSettings};

/// TCP endpoint on loopback with an OS-assigned port.
pub fn ephemeral() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", 0)
}

/// Settings suited to tests: loopback listen socket, short timeouts and a
/// TTL long enough that background sweeps never interfere.
pub fn test_settings() -> GridSettings {
    GridSettings {
        listen_socket: ephemeral(),
        local_allowed: true,
        eviction_ttl: Duration::from_secs(300),
        eviction_interval: Duration::from_millis(50),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
    }
}

/// Grid built from `settings` with the scripted executor and a recording
/// reporter.
pub fn recorded_grid(settings: GridSettings) -> (Grid, Arc<RecordingHealthReporter>) {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let grid = Grid::builder(settings, scripted_executor())
        .reporter(reporter.clone())
        .build();
    (grid, reporter)
}

/// Polls `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
