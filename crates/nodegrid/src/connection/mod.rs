//! Connections to services resolved through the directory.
//!
//! A [`Connection`] is either a direct in-process call into a hosted
//! handler or a socket channel to a remote router. Both sides of the enum
//! expose the same `write` so callers cannot tell them apart.

mod factory;

use std::fmt;
use std::sync::Arc;

use tracing::trace;

pub use self::factory::{ConnectionFactory, Route, route};

use crate::protocol::{MessageEnvelope, Response};
use crate::router::MessageHandler;
use crate::transport::{Channel, ConnectionError};

pub(crate) const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// Same-process connection that calls the handler directly.
pub struct LocalConnection {
    id: String,
    handler: Arc<dyn MessageHandler>,
}

impl LocalConnection {
    /// Connects to `handler`, known as `id`.
    pub fn new(id: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }
}

/// Connection over a transport channel.
#[derive(Debug)]
pub struct RemoteConnection {
    channel: Box<dyn Channel>,
}

impl RemoteConnection {
    /// Wraps an open channel.
    #[must_use]
    pub fn new(channel: Box<dyn Channel>) -> Self {
        Self { channel }
    }
}

/// Where envelopes written to a service go.
#[derive(Debug)]
pub enum Connection {
    /// In-process call.
    Local(LocalConnection),
    /// Transport channel.
    Remote(RemoteConnection),
}

impl Connection {
    /// Sends `envelope` and returns the reply.
    ///
    /// One-way envelopes complete as soon as they are handed off and yield
    /// an empty value reply carrying the envelope's coordinates.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] when the transport fails. Failures
    /// raised by the recipient arrive as failure responses instead.
    pub fn write(&mut self, envelope: &MessageEnvelope) -> Result<Response, ConnectionError> {
        trace!(
            target: CONNECTION_TARGET,
            peer = %self.peer(),
            recipient = envelope.recipient(),
            sequence = envelope.sequence,
            one_way = envelope.one_way,
            "writing envelope"
        );
        match self {
            Self::Local(local) => {
                let response = local.handler.on_message(envelope);
                if envelope.one_way {
                    Ok(Response::accepted(&envelope.conversation()))
                } else {
                    Ok(response)
                }
            }
            Self::Remote(remote) => {
                if envelope.one_way {
                    remote.channel.send(envelope)?;
                    Ok(Response::accepted(&envelope.conversation()))
                } else {
                    remote.channel.request(envelope)
                }
            }
        }
    }

    /// Returns `true` for in-process connections.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Display form of the other end.
    #[must_use]
    pub fn peer(&self) -> String {
        match self {
            Self::Local(local) => format!("local:{}", local.id),
            Self::Remote(remote) => remote.channel.peer(),
        }
    }
}

impl fmt::Debug for LocalConnection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LocalConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
