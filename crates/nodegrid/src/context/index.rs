//! Bijection between caller-chosen session ids and node-minted instance ids.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Pairs dropped by [`SessionIndex::bind`] to keep the mapping injective.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Displaced {
    /// Instance id previously bound to the session id.
    pub instance_id: Option<String>,
    /// Session id previously bound to the instance id.
    pub session_id: Option<String>,
}

#[derive(Debug, Default)]
struct Pairs {
    by_session: HashMap<String, String>,
    by_instance: HashMap<String, String>,
}

/// Injective in both directions at every instant.
///
/// Both directions live behind one lock so an insert or removal is never
/// observed half-applied.
#[derive(Debug, Default)]
pub struct SessionIndex {
    pairs: RwLock<Pairs>,
}

impl SessionIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `session_id` to `instance_id`, dropping any pair that shared
    /// either side.
    pub fn bind(&self, session_id: &str, instance_id: &str) -> Displaced {
        let mut pairs = self.write();
        let mut displaced = Displaced::default();

        if let Some(previous) = pairs.by_session.remove(session_id) {
            pairs.by_instance.remove(&previous);
            if previous != instance_id {
                displaced.instance_id = Some(previous);
            }
        }
        if let Some(previous) = pairs.by_instance.remove(instance_id) {
            pairs.by_session.remove(&previous);
            if previous != session_id {
                displaced.session_id = Some(previous);
            }
        }

        pairs
            .by_session
            .insert(session_id.to_owned(), instance_id.to_owned());
        pairs
            .by_instance
            .insert(instance_id.to_owned(), session_id.to_owned());
        displaced
    }

    /// Instance id bound to `session_id`.
    #[must_use]
    pub fn instance_of(&self, session_id: &str) -> Option<String> {
        self.read().by_session.get(session_id).cloned()
    }

    /// Session id bound to `instance_id`.
    #[must_use]
    pub fn session_of(&self, instance_id: &str) -> Option<String> {
        self.read().by_instance.get(instance_id).cloned()
    }

    /// Removes the pair keyed by `session_id`, returning its instance id.
    pub fn remove_session(&self, session_id: &str) -> Option<String> {
        let mut pairs = self.write();
        let instance_id = pairs.by_session.remove(session_id)?;
        pairs.by_instance.remove(&instance_id);
        Some(instance_id)
    }

    /// Removes the pair keyed by `instance_id`, returning its session id.
    pub fn remove_instance(&self, instance_id: &str) -> Option<String> {
        let mut pairs = self.write();
        let session_id = pairs.by_instance.remove(instance_id)?;
        pairs.by_session.remove(&session_id);
        Some(session_id)
    }

    /// Removes the pair in which `key` appears on either side.
    ///
    /// Returns `true` when a pair was removed.
    pub fn forget(&self, key: &str) -> bool {
        let mut pairs = self.write();
        if let Some(instance_id) = pairs.by_session.remove(key) {
            pairs.by_instance.remove(&instance_id);
            return true;
        }
        if let Some(session_id) = pairs.by_instance.remove(key) {
            pairs.by_session.remove(&session_id);
            return true;
        }
        false
    }

    /// Number of bound pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().by_session.len()
    }

    /// Returns `true` when no pair is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave the pair maps out of step:
    // every mutation above completes both sides before releasing it.
    fn read(&self) -> RwLockReadGuard<'_, Pairs> {
        self.pairs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Pairs> {
        self.pairs.write().unwrap_or_else(PoisonError::into_inner)
    }
}
