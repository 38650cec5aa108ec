//! Node routing for a distributed execution grid.
//!
//! A caller locates an execution node through the [`directory`], obtains a
//! [`Connection`] from the grid's [`ConnectionFactory`] and sends it
//! envelopes numbered by a [`MessageSession`]. When the node is hosted in
//! the same process and local shortcutting is allowed, the connection calls
//! the node directly. Otherwise the envelope travels over the socket
//! transport to a [`MultiplexRouter`], which delivers it to the node by
//! recipient id. Either way the caller sees the same [`Response`].
//!
//! Each [`ExecutionNode`] owns a [`SessionContextStore`]. Values bound with
//! `set` stay until removed; values bound with `set_temporary` are swept by
//! the node's [`EvictionJob`] once untouched for longer than the configured
//! TTL. Stateful sessions bound permanently receive an instance id, and the
//! node keeps the session id ↔ instance id mapping consistent in both
//! directions.
//!
//! Commands are opaque to this crate. A [`CommandExecutor`] supplied when
//! the grid is built runs them against a [`ResolutionContext`] that exposes
//! the node's bindings, the caller's session and a per-call result slot.
//!
//! [`bootstrap_with`] assembles a grid from layered configuration (see
//! [`nodegrid_config`]), initialising structured telemetry and reporting
//! lifecycle events through a [`HealthReporter`].

mod bootstrap;
pub mod capability;
mod client;
pub mod connection;
pub mod context;
pub mod directory;
pub mod grid;
mod health;
pub mod node;
pub mod protocol;
pub mod router;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use capability::{Capability, CapabilityRegistry};
pub use client::NodeClient;
pub use connection::{Connection, ConnectionFactory, Route};
pub use context::{ContextValue, EvictionJob, SessionContextStore, StatefulSession};
pub use directory::{Directory, InMemoryDirectory, RemoteDirectory, ServiceDescriptor};
pub use grid::{Grid, GridBuilder, GridError, GridServices, GridSettings};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use node::{CommandError, CommandExecutor, CommandPayload, ExecutionNode, ResolutionContext};
pub use protocol::{Failure, FailureClass, MessageEnvelope, MessageSession, Response};
pub use router::{MessageHandler, MultiplexRouter};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
