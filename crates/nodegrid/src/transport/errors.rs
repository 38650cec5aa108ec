//! Error types for listeners and outbound connections.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::FrameError;

/// Errors surfaced while binding or running a socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP host did not resolve.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Host as configured.
        host: String,
        /// Port as configured.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// The TCP host resolved to no usable address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Host as configured.
        host: String,
        /// Port as configured.
        port: u16,
    },
    /// Binding the TCP socket failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Resolved address.
        addr: SocketAddr,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// The bound TCP socket could not report its address.
    #[error("failed to read bound address: {source}")]
    LocalAddr {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The socket could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Endpoint as configured.
        endpoint: String,
    },
    /// The socket directory could not be prepared.
    #[cfg(unix)]
    #[error("failed to prepare unix socket directory: {source}")]
    UnixPrepare {
        /// Preparation failure.
        #[source]
        source: nodegrid_config::SocketPreparationError,
    },
    /// Binding the Unix socket failed.
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// Socket path.
        path: String,
        /// Bind failure.
        #[source]
        source: io::Error,
    },
    /// A live listener already owns the socket path.
    #[cfg(unix)]
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path.
        path: String,
    },
    /// Something other than a socket occupies the path.
    #[cfg(unix)]
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// Socket path.
        path: String,
    },
    /// The existing socket file could not be inspected.
    #[cfg(unix)]
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        /// Socket path.
        path: String,
        /// Metadata failure.
        #[source]
        source: io::Error,
    },
    /// Probing the existing socket failed for a reason other than it being
    /// stale.
    #[cfg(unix)]
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        /// Socket path.
        path: String,
        /// Connect failure.
        #[source]
        source: io::Error,
    },
    /// A stale socket file could not be removed.
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path.
        path: String,
        /// Removal failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not start.
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        /// Spawn failure.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Errors surfaced by outbound connections.
///
/// Timeouts are reported as [`ConnectionError::Timeout`] carrying the
/// original IO error.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The endpoint did not resolve.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// Remote endpoint.
        endpoint: String,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// The connection attempt failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Remote endpoint.
        endpoint: String,
        /// Connect failure.
        #[source]
        source: io::Error,
    },
    /// Socket options could not be applied.
    #[error("failed to configure connection to {endpoint}: {source}")]
    Configure {
        /// Remote endpoint.
        endpoint: String,
        /// Configuration failure.
        #[source]
        source: io::Error,
    },
    /// A connect, read or write exceeded its timeout.
    #[error("timed out talking to {endpoint}: {source}")]
    Timeout {
        /// Remote endpoint.
        endpoint: String,
        /// The timed-out operation's error.
        #[source]
        source: io::Error,
    },
    /// The peer closed the stream before replying.
    #[error("connection to {endpoint} closed before a reply arrived")]
    Closed {
        /// Remote endpoint.
        endpoint: String,
    },
    /// A frame could not be read or written.
    #[error("framing error on connection to {endpoint}: {source}")]
    Frame {
        /// Remote endpoint.
        endpoint: String,
        /// Framing failure.
        #[source]
        source: FrameError,
    },
    /// The reply was not a valid response.
    #[error("failed to decode reply from {endpoint}: {source}")]
    Decode {
        /// Remote endpoint.
        endpoint: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// The reply belongs to another conversation.
    #[error("reply for {received_session}#{received} does not match request {expected_session}#{expected}")]
    Correlation {
        /// Session id of the request.
        expected_session: String,
        /// Sequence of the request.
        expected: u64,
        /// Session id carried by the reply.
        received_session: String,
        /// Sequence carried by the reply.
        received: u64,
    },
    /// No connector is installed for the transport.
    #[error("transport '{transport}' is not registered")]
    UnsupportedTransport {
        /// Transport name.
        transport: String,
    },
    /// The service is neither hosted locally nor reachable over a known
    /// transport.
    #[error("no route to service {id}: no usable address and no local instance")]
    NoRoute {
        /// Service id.
        id: String,
    },
    /// Unix sockets are not available on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Remote endpoint.
        endpoint: String,
    },
}

impl ConnectionError {
    /// Maps a frame error on `endpoint`, separating timeouts.
    pub(crate) fn from_frame(endpoint: &impl ToString, error: FrameError) -> Self {
        let endpoint = endpoint.to_string();
        match error {
            FrameError::Io(source) if is_timeout(&source) => Self::Timeout { endpoint, source },
            source => Self::Frame { endpoint, source },
        }
    }

    /// Returns `true` when the failure was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_keep_their_source() {
        let error = ConnectionError::from_frame(
            &"tcp://127.0.0.1:1",
            FrameError::Io(io::Error::new(io::ErrorKind::WouldBlock, "slow peer")),
        );
        let ConnectionError::Timeout { source, .. } = &error else {
            panic!("expected timeout, got {error:?}");
        };
        assert_eq!(source.kind(), io::ErrorKind::WouldBlock);
        assert!(error.is_timeout());
    }

    #[test]
    fn other_frame_errors_are_not_timeouts() {
        let error = ConnectionError::from_frame(
            &"tcp://127.0.0.1:1",
            FrameError::TooLarge { max_size: 1 },
        );
        assert!(matches!(error, ConnectionError::Frame { .. }));
    }
}
