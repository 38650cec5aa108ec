//! Command executor double with a fixed script of commands.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};

use crate::context::{ContextValue, StatefulSession};
use crate::node::{CommandError, CommandExecutor, CommandPayload, ResolutionContext};

/// Session holding a counter.
#[derive(Debug, Default)]
pub struct CounterSession {
    count: AtomicU64,
}

impl CounterSession {
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl StatefulSession for CounterSession {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Executor understanding a handful of commands:
///
/// - `echo` returns its arguments;
/// - `increment` bumps the addressed [`CounterSession`];
/// - `slot` returns the call's result slot name;
/// - `store-result` writes its arguments to the result slot and reads them back;
/// - `open-session` binds a new counter under `arguments.sessionId`;
/// - `open-temporary` binds a new counter evictably;
/// - `fail` always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedExecutor;

impl CommandExecutor for ScriptedExecutor {
    fn execute(
        &self,
        command: &CommandPayload,
        context: &mut ResolutionContext<'_>,
    ) -> Result<Option<Value>, CommandError> {
        match command.name.as_str() {
            "echo" => Ok(Some(command.arguments.clone())),
            "increment" => {
                let counter = context
                    .session()
                    .and_then(|session| session.as_any().downcast_ref::<CounterSession>())
                    .ok_or_else(|| CommandError::new(&command.name, "no counter session addressed"))?;
                Ok(Some(json!(counter.increment())))
            }
            "slot" => Ok(Some(Value::String(context.result_slot().to_owned()))),
            "store-result" => {
                context.set_result(command.arguments.clone());
                Ok(context.result().cloned())
            }
            "open-session" => {
                let session_id = session_id(command)?;
                let instance_id = context
                    .node()
                    .set(&session_id, ContextValue::session(CounterSession::default()));
                Ok(instance_id.map(Value::String))
            }
            "open-temporary" => {
                let session_id = session_id(command)?;
                context
                    .node()
                    .set_temporary(&session_id, ContextValue::session(CounterSession::default()));
                Ok(None)
            }
            "fail" => Err(CommandError::new(&command.name, "scripted failure")),
            other => Err(CommandError::new(other, "not in the script")),
        }
    }
}

/// The scripted executor behind the trait object nodes expect.
pub fn scripted_executor() -> Arc<dyn CommandExecutor> {
    Arc::new(ScriptedExecutor)
}

fn session_id(command: &CommandPayload) -> Result<String, CommandError> {
    command
        .arguments
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CommandError::new(&command.name, "missing sessionId"))
}
