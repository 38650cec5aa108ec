//! Multiplex router: one endpoint, many recipients.
//!
//! A router owns at most one listening endpoint and a table of handlers
//! keyed by recipient id. Inbound envelopes are delivered to the handler
//! named by their `recipient_id`; an unknown recipient is answered with a
//! protocol failure. The endpoint is closed when the last handler is
//! unregistered.

mod connection;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use nodegrid_config::SocketEndpoint;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::protocol::{DispatchError, MessageEnvelope, Response};
use crate::transport::{ConnectionHandler, ListenerError, ListenerHandle};

use self::connection::RouterConnectionHandler;

pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Receives envelopes addressed to one recipient id.
pub trait MessageHandler: Send + Sync {
    /// Handles `envelope` and produces the reply. The reply is discarded for
    /// one-way envelopes.
    fn on_message(&self, envelope: &MessageEnvelope) -> Response;
}

/// Errors surfaced by router bookkeeping.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A handler is already registered under the id.
    #[error("recipient '{id}' is already registered")]
    DuplicateRecipient {
        /// Recipient id.
        id: String,
    },
    /// The router already owns a listener.
    #[error("router already serves endpoint {endpoint}")]
    AlreadyAttached {
        /// Endpoint of the attached listener.
        endpoint: SocketEndpoint,
    },
    /// The listener could not be started.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// What [`MultiplexRouter::unregister`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// No handler was registered under the id.
    Absent,
    /// Other handlers remain; the endpoint stays open.
    Retained {
        /// Handlers still registered.
        remaining: usize,
    },
    /// The last handler left; the endpoint, if any, has been closed.
    Closed,
}

/// Routes envelopes arriving on one endpoint to registered handlers.
#[derive(Default)]
pub struct MultiplexRouter {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl MultiplexRouter {
    /// Creates a router with no handlers and no endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::DuplicateRecipient` when `id` is taken.
    pub fn register(&self, id: &str, handler: Arc<dyn MessageHandler>) -> Result<(), RouterError> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(id) {
            return Err(RouterError::DuplicateRecipient { id: id.to_owned() });
        }
        handlers.insert(id.to_owned(), handler);
        debug!(target: ROUTER_TARGET, recipient = id, "recipient registered");
        Ok(())
    }

    /// Removes the handler registered under `id`, closing the endpoint when
    /// it was the last one.
    pub fn unregister(&self, id: &str) -> Release {
        let remaining = {
            let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
            if handlers.remove(id).is_none() {
                return Release::Absent;
            }
            handlers.len()
        };
        debug!(target: ROUTER_TARGET, recipient = id, remaining, "recipient unregistered");
        if remaining > 0 {
            return Release::Retained { remaining };
        }
        if let Err(error) = self.close() {
            warn!(
                target: ROUTER_TARGET,
                error = %error,
                "failed to stop listener after last recipient left"
            );
        }
        Release::Closed
    }

    /// Delivers `envelope` to its recipient.
    pub fn on_message(&self, envelope: &MessageEnvelope) -> Response {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(envelope.recipient())
            .cloned();
        match handler {
            Some(handler) => handler.on_message(envelope),
            None => {
                warn!(
                    target: ROUTER_TARGET,
                    recipient = envelope.recipient(),
                    session_id = %envelope.session_id,
                    sequence = envelope.sequence,
                    "message for unknown recipient"
                );
                let error = DispatchError::unknown_recipient(envelope.recipient());
                Response::failure(&envelope.conversation(), error.to_failure())
            }
        }
    }

    /// Connection handler that serves this router's endpoint.
    ///
    /// The handler holds a weak reference so live connections do not keep a
    /// released router alive.
    #[must_use]
    pub fn connection_handler(self: &Arc<Self>) -> Arc<dyn ConnectionHandler> {
        Arc::new(RouterConnectionHandler::new(Arc::downgrade(self)))
    }

    /// Takes ownership of the running listener for this router's endpoint.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::AlreadyAttached` when an endpoint is already
    /// attached; the rejected handle is shut down.
    pub fn attach(&self, handle: ListenerHandle) -> Result<(), RouterError> {
        let mut listener = self.listener();
        if let Some(existing) = listener.as_ref() {
            handle.shutdown();
            return Err(RouterError::AlreadyAttached {
                endpoint: existing.endpoint().clone(),
            });
        }
        info!(
            target: ROUTER_TARGET,
            endpoint = %handle.endpoint(),
            "router endpoint opened"
        );
        *listener = Some(handle);
        Ok(())
    }

    /// Endpoint currently served, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<SocketEndpoint> {
        self.listener().as_ref().map(|handle| handle.endpoint().clone())
    }

    /// Registered recipient ids, sorted.
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Returns `true` when at least one handler is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Stops and joins the attached listener.
    ///
    /// # Errors
    ///
    /// Returns `ListenerError::ThreadPanic` when the accept loop panicked.
    pub fn close(&self) -> Result<(), ListenerError> {
        let Some(handle) = self.listener().take() else {
            return Ok(());
        };
        let endpoint = handle.endpoint().clone();
        handle.shutdown();
        handle.join()?;
        info!(target: ROUTER_TARGET, endpoint = %endpoint, "router endpoint closed");
        Ok(())
    }

    fn listener(&self) -> MutexGuard<'_, Option<ListenerHandle>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MultiplexRouter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MultiplexRouter")
            .field("recipients", &self.recipients())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}
