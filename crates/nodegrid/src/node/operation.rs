//! Operations an execution node accepts over the wire.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::CommandPayload;
use crate::protocol::{DispatchError, OperationRequest};

/// Service name reported in unknown-operation errors.
pub(crate) const NODE_SERVICE: &str = "execution-node";

/// Arguments of `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteArgs {
    /// The command to run.
    pub command: CommandPayload,
    /// Instance id of the session the command targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// Arguments of `registerKsession`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterArgs {
    /// Logical session name.
    pub logical_name: String,
    /// Instance id the name maps to.
    pub instance_id: String,
}

/// Arguments of `lookupKsession` and `lookupKsessionId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupArgs {
    /// Session id to resolve.
    pub session_id: String,
}

/// Closed set of node operations.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOperation {
    /// Runs a command, optionally against a session.
    Execute(ExecuteArgs),
    /// Records a logical name → instance id mapping.
    RegisterKsession(RegisterArgs),
    /// Resolves a session id to its instance id.
    LookupKsession(LookupArgs),
    /// Same resolution under its second wire name.
    LookupKsessionId(LookupArgs),
}

impl NodeOperation {
    /// Wire name of `execute`.
    pub const EXECUTE: &'static str = "execute";
    /// Wire name of `registerKsession`.
    pub const REGISTER_KSESSION: &'static str = "registerKsession";
    /// Wire name of `lookupKsession`.
    pub const LOOKUP_KSESSION: &'static str = "lookupKsession";
    /// Wire name of `lookupKsessionId`.
    pub const LOOKUP_KSESSION_ID: &'static str = "lookupKsessionId";

    /// Builds an `execute` operation.
    #[must_use]
    pub fn execute(command: CommandPayload, instance_id: Option<String>) -> Self {
        Self::Execute(ExecuteArgs {
            command,
            instance_id,
        })
    }

    /// Builds a `registerKsession` operation.
    pub fn register_ksession(logical_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self::RegisterKsession(RegisterArgs {
            logical_name: logical_name.into(),
            instance_id: instance_id.into(),
        })
    }

    /// Builds a `lookupKsession` operation.
    pub fn lookup_ksession(session_id: impl Into<String>) -> Self {
        Self::LookupKsession(LookupArgs {
            session_id: session_id.into(),
        })
    }

    /// Builds a `lookupKsessionId` operation.
    pub fn lookup_ksession_id(session_id: impl Into<String>) -> Self {
        Self::LookupKsessionId(LookupArgs {
            session_id: session_id.into(),
        })
    }

    /// Wire name of the operation.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Execute(_) => Self::EXECUTE,
            Self::RegisterKsession(_) => Self::REGISTER_KSESSION,
            Self::LookupKsession(_) => Self::LOOKUP_KSESSION,
            Self::LookupKsessionId(_) => Self::LOOKUP_KSESSION_ID,
        }
    }

    /// Parses a wire request.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::UnknownOperation` for names outside the set and
    /// `DispatchError::InvalidArguments` when arguments do not decode.
    pub fn parse(request: &OperationRequest) -> Result<Self, DispatchError> {
        match request.operation() {
            Self::EXECUTE => request.decode_arguments().map(Self::Execute),
            Self::REGISTER_KSESSION => request.decode_arguments().map(Self::RegisterKsession),
            Self::LOOKUP_KSESSION => request.decode_arguments().map(Self::LookupKsession),
            Self::LOOKUP_KSESSION_ID => request.decode_arguments().map(Self::LookupKsessionId),
            other => Err(DispatchError::unknown_operation(NODE_SERVICE, other)),
        }
    }

    /// Encodes the operation for the wire.
    #[must_use]
    pub fn to_request(&self) -> OperationRequest {
        let arguments = match self {
            Self::Execute(args) => {
                let command = json!({
                    "name": args.command.name,
                    "arguments": args.command.arguments,
                });
                match &args.instance_id {
                    Some(instance_id) => json!({"command": command, "instanceId": instance_id}),
                    None => json!({"command": command}),
                }
            }
            Self::RegisterKsession(args) => json!({
                "logicalName": args.logical_name,
                "instanceId": args.instance_id,
            }),
            Self::LookupKsession(args) | Self::LookupKsessionId(args) => json!({
                "sessionId": args.session_id,
            }),
        };
        OperationRequest::new(self.name(), arguments)
    }
}
