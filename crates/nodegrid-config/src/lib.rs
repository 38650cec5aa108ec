//! Shared configuration for grid processes.
//!
//! Settings are layered by [`ortho_config`]: built-in defaults, then an
//! optional configuration file, then `NODEGRID_*` environment variables, then
//! command-line flags. The resolved [`Config`] carries the three options the
//! routing layer recognises (`local_allowed`, `eviction_ttl_millis`,
//! `eviction_interval_millis`) alongside the listen socket, logging and
//! connector timeouts.

mod defaults;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CONNECT_TIMEOUT_MILLIS, DEFAULT_EVICTION_INTERVAL_MILLIS, DEFAULT_EVICTION_TTL_MILLIS,
    DEFAULT_LOCAL_ALLOWED, DEFAULT_LOG_FILTER, DEFAULT_READ_TIMEOUT_MILLIS, DEFAULT_TCP_PORT,
    default_log_filter, default_log_filter_string, default_log_format, default_socket_endpoint,
};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Resolved grid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "NODEGRID")]
pub struct Config {
    /// Endpoint hosted nodes are exposed on by default.
    #[ortho_config(default = default_socket_endpoint())]
    pub listen_socket: SocketEndpoint,
    /// `tracing` filter directive.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log events.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Permits same-process connections to bypass the transport.
    #[ortho_config(default = DEFAULT_LOCAL_ALLOWED)]
    pub local_allowed: bool,
    /// Age after which an untouched evictable entry is removed.
    #[ortho_config(default = DEFAULT_EVICTION_TTL_MILLIS)]
    pub eviction_ttl_millis: u64,
    /// Period of the eviction sweep.
    #[ortho_config(default = DEFAULT_EVICTION_INTERVAL_MILLIS)]
    pub eviction_interval_millis: u64,
    /// Connect timeout applied by the socket connector.
    #[ortho_config(default = DEFAULT_CONNECT_TIMEOUT_MILLIS)]
    pub connect_timeout_millis: u64,
    /// Response timeout applied by the socket connector.
    #[ortho_config(default = DEFAULT_READ_TIMEOUT_MILLIS)]
    pub read_timeout_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_socket: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            local_allowed: DEFAULT_LOCAL_ALLOWED,
            eviction_ttl_millis: DEFAULT_EVICTION_TTL_MILLIS,
            eviction_interval_millis: DEFAULT_EVICTION_INTERVAL_MILLIS,
            connect_timeout_millis: DEFAULT_CONNECT_TIMEOUT_MILLIS,
            read_timeout_millis: DEFAULT_READ_TIMEOUT_MILLIS,
        }
    }
}

impl Config {
    /// Endpoint hosted nodes are exposed on by default.
    #[must_use]
    pub fn listen_socket(&self) -> &SocketEndpoint {
        &self.listen_socket
    }

    /// `tracing` filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for log events.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether same-process connections may bypass the transport.
    #[must_use]
    pub fn local_allowed(&self) -> bool {
        self.local_allowed
    }

    /// Lifetime of evictable entries.
    #[must_use]
    pub fn eviction_ttl(&self) -> Duration {
        Duration::from_millis(self.eviction_ttl_millis)
    }

    /// Period between eviction sweeps.
    #[must_use]
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_millis)
    }

    /// Connect timeout for outbound connections.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_millis)
    }

    /// Response timeout for outbound connections.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_millis)
    }

    /// Rejects values the runtime cannot operate with.
    ///
    /// A zero TTL is allowed (every evictable entry goes on the next sweep),
    /// but a zero sweep interval would spin and a zero socket timeout is
    /// rejected by the standard library.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eviction_interval_millis == 0 {
            return Err(ConfigError::zero("eviction_interval_millis"));
        }
        if self.connect_timeout_millis == 0 {
            return Err(ConfigError::zero("connect_timeout_millis"));
        }
        if self.read_timeout_millis == 0 {
            return Err(ConfigError::zero("read_timeout_millis"));
        }
        Ok(())
    }
}

/// Semantic validation failures for an otherwise well-formed [`Config`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration option that must be positive was zero.
    #[error("configuration option '{option}' must be greater than zero")]
    ZeroDuration {
        /// Name of the offending option.
        option: &'static str,
    },
}

impl ConfigError {
    fn zero(option: &'static str) -> Self {
        Self::ZeroDuration { option }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_permit_local_shortcutting() {
        let config = Config::default();
        assert!(config.local_allowed());
        assert_eq!(config.eviction_ttl(), Duration::from_secs(300));
        assert_eq!(config.eviction_interval(), Duration::from_secs(1));
        assert_eq!(config.log_format(), LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::interval(Config { eviction_interval_millis: 0, ..Config::default() }, "eviction_interval_millis")]
    #[case::connect(Config { connect_timeout_millis: 0, ..Config::default() }, "connect_timeout_millis")]
    #[case::read(Config { read_timeout_millis: 0, ..Config::default() }, "read_timeout_millis")]
    fn validate_rejects_zero_durations(#[case] config: Config, #[case] option: &str) {
        let error = config.validate().expect_err("zero duration must be rejected");
        let ConfigError::ZeroDuration { option: reported } = error;
        assert_eq!(reported, option);
    }

    #[test]
    fn zero_ttl_is_accepted() {
        let config = Config {
            eviction_ttl_millis: 0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("COMPACT", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().expect("parse"), expected);
    }
}
