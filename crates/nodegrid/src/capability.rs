//! Capability tags and the read-only capability registry.
//!
//! A [`Capability`] names what a service is reachable as (directory
//! descriptors) and what kind of value a caller expects when resolving an
//! identifier against a node. The [`CapabilityRegistry`] holds globally
//! registered singletons that a node falls back to when its own context has
//! no binding; it is assembled by the surrounding application and never
//! mutated by the grid.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ContextValue;

/// Open capability tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    /// Addressable execution node.
    pub const EXECUTION_NODE: Self = Self::from_static("execution-node");
    /// Directory service served as a router recipient.
    pub const DIRECTORY: Self = Self::from_static("directory");
    /// Plain text; resolving a session id with this capability yields its
    /// instance id.
    pub const TEXT: Self = Self::from_static("string");
    /// Stateful session handle.
    pub const SESSION: Self = Self::from_static("stateful-session");
    /// No particular expectation.
    pub const ANY: Self = Self::from_static("any");

    /// Builds a tag from a static string.
    #[must_use]
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Builds a tag from any string.
    #[must_use]
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Globally registered values keyed by capability.
#[derive(Debug, Default, Clone)]
pub struct CapabilityRegistry {
    entries: HashMap<Capability, ContextValue>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a singleton for `capability`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, capability: Capability, value: ContextValue) -> Self {
        self.entries.insert(capability, value);
        self
    }

    /// Returns the singleton registered for `capability`.
    #[must_use]
    pub fn lookup(&self, capability: &Capability) -> Option<ContextValue> {
        self.entries.get(capability).cloned()
    }

    /// Number of registered singletons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Capability, ContextValue)> for CapabilityRegistry {
    fn from_iter<I: IntoIterator<Item = (Capability, ContextValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
