//! Socket transport for exposed endpoints and outbound connections.
//!
//! Listeners accept connections on a background thread and serve each one on
//! its own thread. Connectors open a blocking JSONL channel with connect and
//! read timeouts. Both sides are reached through named factories so a grid
//! can be assembled with alternative transports.

mod connector;
mod errors;
mod factory;
mod framing;
mod listener;
mod stream;

pub use self::connector::{Channel, SocketChannel, connect};
pub use self::errors::{ConnectionError, ListenerError};
pub use self::factory::{
    AcceptorFactory, ConnectorFactory, SOCKET_TRANSPORT, SocketAcceptorFactory,
    SocketConnectorFactory, TransportRegistry,
};
pub use self::framing::{FrameError, MAX_FRAME_BYTES, read_frame, read_frame_into, write_frame};
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::stream::{ConnectionHandler, ConnectionStream};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
const CONNECTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connector");
