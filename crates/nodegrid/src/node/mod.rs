//! Execution node: a named service owning a session context.
//!
//! The node binds values under identifiers, mints instance ids for stored
//! sessions, resolves caller-chosen session ids to those instance ids and
//! runs commands through the [`CommandExecutor`] it was built with. It is
//! reachable through a [`MultiplexRouter`](crate::router::MultiplexRouter)
//! under its id and answers the four wire operations of [`NodeOperation`].

mod command;
mod operation;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

pub use self::command::{CommandError, CommandExecutor, CommandPayload, ResolutionContext};
pub use self::operation::{ExecuteArgs, LookupArgs, NodeOperation, RegisterArgs};

use crate::capability::{Capability, CapabilityRegistry};
use crate::context::{
    ContextValue, EvictionError, EvictionHandle, EvictionJob, SessionContextStore, SessionIndex,
};
use crate::protocol::{Conversation, DispatchError, MessageEnvelope, Response};
use crate::router::MessageHandler;

pub(crate) const NODE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::node");

/// Implementation tag recorded in directory descriptors of grid-hosted
/// nodes.
pub const NODE_IMPLEMENTATION: Capability = Capability::from_static("nodegrid::ExecutionNode");

/// A named service owning a session context.
pub struct ExecutionNode {
    id: String,
    store: Arc<SessionContextStore>,
    index: Arc<SessionIndex>,
    executor: Arc<dyn CommandExecutor>,
    capabilities: Arc<CapabilityRegistry>,
    eviction: Mutex<Option<EvictionHandle>>,
    retired: AtomicBool,
}

impl ExecutionNode {
    /// Creates a node with an empty context.
    pub fn new(
        id: impl Into<String>,
        executor: Arc<dyn CommandExecutor>,
        capabilities: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            id: id.into(),
            store: Arc::new(SessionContextStore::new()),
            index: Arc::new(SessionIndex::new()),
            executor,
            capabilities,
            eviction: Mutex::new(None),
            retired: AtomicBool::new(false),
        }
    }

    /// Node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The node's context store.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionContextStore> {
        &self.store
    }

    /// Eviction job over this node's store. Evicted keys also drop out of
    /// the session index.
    #[must_use]
    pub fn eviction_job(&self, ttl: Duration, interval: Duration) -> EvictionJob {
        EvictionJob::new(Arc::clone(&self.store), ttl, interval)
            .with_index(Arc::clone(&self.index))
            .with_label(self.id.clone())
    }

    /// Starts the background eviction sweep, replacing any running one.
    ///
    /// # Errors
    ///
    /// Returns an [`EvictionError`] when the sweep thread cannot start.
    pub fn start_eviction(&self, ttl: Duration, interval: Duration) -> Result<(), EvictionError> {
        let handle = self.eviction_job(ttl, interval).spawn()?;
        let previous = self
            .eviction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            stop_eviction(&self.id, previous);
        }
        Ok(())
    }

    /// Resolves `identifier`.
    ///
    /// With `expected` set to [`Capability::TEXT`] a bound session id resolves
    /// to its instance id. Otherwise the node's own context is consulted,
    /// then the capability registry.
    #[must_use]
    pub fn get(&self, identifier: &str, expected: &Capability) -> Option<ContextValue> {
        if *expected == Capability::TEXT
            && let Some(instance_id) = self.index.instance_of(identifier)
        {
            return Some(ContextValue::text(instance_id));
        }
        self.store
            .get(identifier)
            .or_else(|| self.capabilities.lookup(expected))
    }

    /// Binds `identifier` permanently.
    ///
    /// Binding a session also binds it under a freshly minted instance id,
    /// maps `identifier` to that id and returns it. Binding anything else
    /// drops the mapping of `identifier`, and the instance id alias too when
    /// the replaced value was a session.
    pub fn set(&self, identifier: &str, value: ContextValue) -> Option<String> {
        if !value.is_session() {
            let previous = self.store.insert(identifier, value);
            let unbound = self.index.remove_session(identifier);
            if let (Some(ContextValue::Session(_)), Some(instance_id)) = (previous, unbound) {
                self.store.remove(&instance_id);
            }
            return None;
        }
        let instance_id = Uuid::new_v4().to_string();
        self.store.insert(instance_id.clone(), value.clone());
        self.store.insert(identifier, value);
        let displaced = self.index.bind(identifier, &instance_id);
        if let Some(stale) = displaced.instance_id {
            self.store.remove(&stale);
        }
        debug!(
            target: NODE_TARGET,
            node = %self.id,
            session_id = identifier,
            instance_id = %instance_id,
            "session bound"
        );
        Some(instance_id)
    }

    /// Binds `identifier` as evictable. Sessions bound this way get no
    /// instance id.
    pub fn set_temporary(&self, identifier: &str, value: ContextValue) {
        self.store.insert_evictable(identifier, value, Instant::now());
    }

    /// Refreshes the eviction timestamp of `identifier`.
    pub fn touch(&self, identifier: &str) -> bool {
        self.store.touch(identifier, Instant::now())
    }

    /// Unbinds `identifier`, together with its instance id alias and
    /// mapping.
    pub fn remove(&self, identifier: &str) -> Option<ContextValue> {
        if let Some(instance_id) = self.index.remove_session(identifier) {
            self.store.remove(&instance_id);
        }
        self.store.remove(identifier)
    }

    /// Records that `logical_name` refers to `instance_id`.
    ///
    /// A session already bound under `logical_name` stays in place; the
    /// mapping then lives in the session index only.
    pub fn register_ksession(&self, logical_name: &str, instance_id: &str) {
        self.store
            .insert_unless_session(logical_name, ContextValue::text(instance_id));
        let displaced = self.index.bind(logical_name, instance_id);
        if let Some(session_id) = displaced.session_id {
            debug!(
                target: NODE_TARGET,
                node = %self.id,
                instance_id,
                previous = %session_id,
                "instance id rebound to a new session id"
            );
        }
    }

    /// Resolves `session_id` to an instance id.
    #[must_use]
    pub fn lookup_ksession(&self, session_id: &str) -> Option<String> {
        self.resolve_instance_id(session_id)
    }

    /// Resolves `session_id` to an instance id; identical to
    /// [`ExecutionNode::lookup_ksession`].
    #[must_use]
    pub fn lookup_ksession_id(&self, session_id: &str) -> Option<String> {
        self.resolve_instance_id(session_id)
    }

    /// Runs a parsed operation.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Command` when the executor fails.
    pub fn dispatch(
        &self,
        operation: NodeOperation,
        conversation: &Conversation,
    ) -> Result<Option<Value>, DispatchError> {
        match operation {
            NodeOperation::Execute(args) => self.execute(args, conversation),
            NodeOperation::RegisterKsession(args) => {
                self.register_ksession(&args.logical_name, &args.instance_id);
                Ok(None)
            }
            NodeOperation::LookupKsession(args) => {
                Ok(self.lookup_ksession(&args.session_id).map(Value::String))
            }
            NodeOperation::LookupKsessionId(args) => {
                Ok(self.lookup_ksession_id(&args.session_id).map(Value::String))
            }
        }
    }

    /// Stops eviction and refuses further messages.
    pub fn shutdown(&self) {
        self.retired.store(true, Ordering::SeqCst);
        let handle = self
            .eviction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            stop_eviction(&self.id, handle);
        }
    }

    /// Returns `true` once [`ExecutionNode::shutdown`] has run.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn execute(
        &self,
        args: ExecuteArgs,
        conversation: &Conversation,
    ) -> Result<Option<Value>, DispatchError> {
        let session = args
            .instance_id
            .as_deref()
            .and_then(|instance_id| self.get(instance_id, &Capability::SESSION))
            .and_then(|value| value.as_session().cloned());
        if session.is_none()
            && let Some(instance_id) = args.instance_id.as_deref()
        {
            debug!(
                target: NODE_TARGET,
                node = %self.id,
                instance_id,
                "no session bound to instance id; executing without one"
            );
        }
        let mut context = ResolutionContext::new(self, conversation, session);
        Ok(self.executor.execute(&args.command, &mut context)?)
    }

    fn resolve_instance_id(&self, session_id: &str) -> Option<String> {
        if let Some(instance_id) = self.index.instance_of(session_id) {
            return Some(instance_id);
        }
        if self.index.session_of(session_id).is_some() {
            return Some(session_id.to_owned());
        }
        let instance_id = match self.store.get(session_id)? {
            ContextValue::Data(Value::String(instance_id)) => instance_id,
            ContextValue::Session(_) => session_id.to_owned(),
            ContextValue::Data(_) => return None,
        };
        if !self.store.is_evictable(session_id) {
            self.index.bind(session_id, &instance_id);
        }
        Some(instance_id)
    }
}

impl MessageHandler for ExecutionNode {
    fn on_message(&self, envelope: &MessageEnvelope) -> Response {
        let conversation = envelope.conversation();
        if self.is_retired() {
            let error = DispatchError::unknown_recipient(self.id.clone());
            return Response::failure(&conversation, error.to_failure());
        }
        let result = NodeOperation::parse(&envelope.payload)
            .and_then(|operation| self.dispatch(operation, &conversation));
        if let Err(error) = &result {
            warn!(
                target: NODE_TARGET,
                node = %self.id,
                operation = envelope.payload.operation(),
                session_id = %envelope.session_id,
                sequence = envelope.sequence,
                error = %error,
                "operation failed"
            );
        }
        Response::from_result(&conversation, result)
    }
}

impl fmt::Debug for ExecutionNode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExecutionNode")
            .field("id", &self.id)
            .field("entries", &self.store.len())
            .field("sessions", &self.index.len())
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

impl Drop for ExecutionNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_eviction(node: &str, handle: EvictionHandle) {
    if let Err(error) = handle.join() {
        warn!(
            target: NODE_TARGET,
            node,
            error = %error,
            "eviction job did not stop cleanly"
        );
    }
}
