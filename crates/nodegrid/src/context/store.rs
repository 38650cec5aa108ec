//! Concurrent identifier → value store with per-entry eviction timestamps.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::ContextValue;

/// Values keyed by identifier, with a separate touch map for evictable
/// entries.
///
/// Every evictable key present in `touched` is also present in `values`.
/// Mutations that cover both maps take the `values` shard lock first and
/// only then touch `touched`, so the two never deadlock and a sweep never
/// removes an entry that was concurrently made permanent or refreshed.
#[derive(Debug, Default)]
pub struct SessionContextStore {
    values: DashMap<String, ContextValue>,
    touched: DashMap<String, Instant>,
}

impl SessionContextStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value bound to `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ContextValue> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    /// Returns `true` when `key` is bound.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Binds `key` permanently, clearing any eviction timestamp.
    pub fn insert(&self, key: impl Into<String>, value: ContextValue) -> Option<ContextValue> {
        match self.values.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                self.touched.remove(occupied.key());
                Some(occupied.insert(value))
            }
            Entry::Vacant(vacant) => {
                self.touched.remove(vacant.key());
                vacant.insert(value);
                None
            }
        }
    }

    /// Binds `key` permanently unless a session is bound under it.
    ///
    /// Returns `false`, leaving the entry untouched, when `key` holds a
    /// session.
    pub fn insert_unless_session(&self, key: impl Into<String>, value: ContextValue) -> bool {
        match self.values.entry(key.into()) {
            Entry::Occupied(occupied) if occupied.get().is_session() => false,
            Entry::Occupied(mut occupied) => {
                self.touched.remove(occupied.key());
                occupied.insert(value);
                true
            }
            Entry::Vacant(vacant) => {
                self.touched.remove(vacant.key());
                vacant.insert(value);
                true
            }
        }
    }

    /// Binds `key` as evictable, stamped with `now`.
    pub fn insert_evictable(
        &self,
        key: impl Into<String>,
        value: ContextValue,
        now: Instant,
    ) -> Option<ContextValue> {
        match self.values.entry(key.into()) {
            Entry::Occupied(mut occupied) => {
                self.touched.insert(occupied.key().clone(), now);
                Some(occupied.insert(value))
            }
            Entry::Vacant(vacant) => {
                self.touched.insert(vacant.key().clone(), now);
                vacant.insert(value);
                None
            }
        }
    }

    /// Refreshes the timestamp of an evictable entry.
    ///
    /// Returns `false` when `key` is unbound or permanent.
    pub fn touch(&self, key: &str, now: Instant) -> bool {
        match self.touched.get_mut(key) {
            Some(mut stamp) => {
                *stamp = now;
                true
            }
            None => false,
        }
    }

    /// Unbinds `key`.
    pub fn remove(&self, key: &str) -> Option<ContextValue> {
        self.values
            .remove_if(key, |_, _| {
                self.touched.remove(key);
                true
            })
            .map(|(_, value)| value)
    }

    /// Returns `true` when `key` is bound and evictable.
    #[must_use]
    pub fn is_evictable(&self, key: &str) -> bool {
        self.touched.contains_key(key)
    }

    /// Number of bound identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of evictable entries.
    #[must_use]
    pub fn evictable_len(&self) -> usize {
        self.touched.len()
    }

    /// Removes every evictable entry whose age at `now` exceeds `ttl`.
    ///
    /// Returns the number of candidates examined and the evicted keys.
    pub fn evict_expired(&self, now: Instant, ttl: Duration) -> (usize, Vec<String>) {
        let candidates: Vec<String> = self
            .touched
            .iter()
            .filter(|entry| now.saturating_duration_since(*entry.value()) > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let evicted = candidates
            .iter()
            .filter(|key| {
                self.values
                    .remove_if(key.as_str(), |_, _| {
                        self.touched
                            .remove_if(key.as_str(), |_, stamp| {
                                now.saturating_duration_since(*stamp) > ttl
                            })
                            .is_some()
                    })
                    .is_some()
            })
            .cloned()
            .collect();
        (candidates.len(), evicted)
    }
}
