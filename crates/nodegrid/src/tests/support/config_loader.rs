//! Configuration loaders for bootstrap scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use nodegrid_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader that places the listen socket inside a fresh temporary directory.
pub struct TempSocketConfigLoader {
    dir: TempDir,
}

impl TempSocketConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        Self { dir }
    }

    /// Directory the listen socket lives in; absent until bootstrap runs.
    pub fn socket_dir(&self) -> Utf8PathBuf {
        let root = Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf())
            .expect("temporary directory path was not valid UTF-8");
        root.join("run")
    }
}

impl Default for TempSocketConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TempSocketConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            listen_socket: SocketEndpoint::unix(self.socket_dir().join("grid.sock")),
            log_format: nodegrid_config::LogFormat::Compact,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an invalid socket flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("nodegrid"),
            OsString::from("--listen-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
