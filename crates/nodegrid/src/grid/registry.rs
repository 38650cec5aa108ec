//! Nodes hosted by this process.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::GridError;
use crate::node::ExecutionNode;

/// Locally hosted nodes keyed by id.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, Arc<ExecutionNode>>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` under its id.
    ///
    /// # Errors
    ///
    /// Returns `GridError::NodeAlreadyHosted` when the id is taken.
    pub fn insert(&self, node: Arc<ExecutionNode>) -> Result<(), GridError> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if nodes.contains_key(node.id()) {
            return Err(GridError::NodeAlreadyHosted {
                id: node.id().to_owned(),
            });
        }
        nodes.insert(node.id().to_owned(), node);
        Ok(())
    }

    /// Returns the node hosted under `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ExecutionNode>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Drops the node hosted under `id`.
    pub fn remove(&self, id: &str) -> Option<Arc<ExecutionNode>> {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Returns `true` when `id` is hosted.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Ids of hosted nodes, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of hosted nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` when no node is hosted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
