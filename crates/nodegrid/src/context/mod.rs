//! Per-node session context: value store, session index and eviction.

mod eviction;
mod index;
mod store;
mod value;

pub use self::eviction::{EvictionError, EvictionHandle, EvictionJob, SweepReport};
pub use self::index::{Displaced, SessionIndex};
pub use self::store::SessionContextStore;
pub use self::value::{ContextValue, SessionRef, StatefulSession};
