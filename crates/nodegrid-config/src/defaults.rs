use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::LogFormat;
use crate::socket::SocketEndpoint;

/// TCP port used for the listen socket when Unix domain sockets are unavailable.
pub const DEFAULT_TCP_PORT: u16 = 7411;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Same-process shortcutting is permitted unless configured otherwise.
pub const DEFAULT_LOCAL_ALLOWED: bool = true;

/// Lifetime of an evictable context entry before a sweep may remove it.
pub const DEFAULT_EVICTION_TTL_MILLIS: u64 = 300_000;

/// Period between eviction sweeps.
pub const DEFAULT_EVICTION_INTERVAL_MILLIS: u64 = 1_000;

/// Upper bound on establishing an outbound connection.
pub const DEFAULT_CONNECT_TIMEOUT_MILLIS: u64 = 5_000;

/// Upper bound on waiting for a response on an outbound connection.
pub const DEFAULT_READ_TIMEOUT_MILLIS: u64 = 30_000;

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default listen socket for hosted nodes.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("nodegrid");
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join("grid.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
