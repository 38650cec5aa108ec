//! Layering tests: defaults < file < environment < command line.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig as _;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use nodegrid_config::{Config, DEFAULT_EVICTION_INTERVAL_MILLIS, SocketEndpoint};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const TTL_VAR: &str = "NODEGRID_EVICTION_TTL_MILLIS";

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in the 2024 edition; the guard
        // serialises access and `Drop` restores the previous value.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

struct ConfigFile {
    _dir: TempDir,
    args: Vec<OsString>,
}

#[fixture]
fn config_file() -> ConfigFile {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("nodegrid.toml");
    fs::write(
        &path,
        concat!(
            "local_allowed = false\n",
            "eviction_ttl_millis = 1000\n",
            "listen_socket = { transport = \"tcp\", host = \"127.0.0.1\", port = 7420 }\n",
        ),
    )
    .expect("write config");
    let args = vec![
        OsString::from("nodegrid"),
        OsString::from("--config-path"),
        path.into_os_string(),
    ];
    ConfigFile { _dir: dir, args }
}

#[rstest]
fn file_values_override_defaults(config_file: ConfigFile) {
    let _lock = ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let config = Config::load_from_iter(config_file.args.clone()).expect("load config");

    assert!(!config.local_allowed());
    assert_eq!(config.eviction_ttl_millis, 1000);
    assert_eq!(config.eviction_interval_millis, DEFAULT_EVICTION_INTERVAL_MILLIS);
    assert_eq!(
        config.listen_socket(),
        &SocketEndpoint::tcp("127.0.0.1", 7420)
    );
}

#[rstest]
fn environment_overrides_file(config_file: ConfigFile) {
    let _env = EnvOverride::set_var(TTL_VAR, OsStr::new("2000"));
    let config = Config::load_from_iter(config_file.args.clone()).expect("load config");

    assert_eq!(config.eviction_ttl_millis, 2000);
    assert!(!config.local_allowed());
}

#[rstest]
fn command_line_overrides_environment(config_file: ConfigFile) {
    let _env = EnvOverride::set_var(TTL_VAR, OsStr::new("2000"));
    let mut args = config_file.args.clone();
    args.push(OsString::from("--eviction-ttl-millis"));
    args.push(OsString::from("3000"));

    let config = Config::load_from_iter(args).expect("load config");

    assert_eq!(config.eviction_ttl_millis, 3000);
}
