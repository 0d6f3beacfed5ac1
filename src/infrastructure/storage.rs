//! Concurrent keyed storage shared by the gateway components.
//!
//! Breakers, rate-limit windows, cache entries and running timers all live in
//! sharded maps so that unrelated keys never contend on one lock.

use dashmap::DashMap;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;

/// Thread-safe sharded storage backed by DashMap.
///
/// DashMap provides fine-grained per-shard locking, so a read-modify-write on
/// one key is atomic with respect to other callers touching the same key.
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    map: DashMap<K, V>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    /// Create a new sharded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
        }
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.map.insert(key, value)
    }

    /// Access an entry mutably, creating it with `factory` if absent.
    ///
    /// The shard lock is held for the duration of `accessor`, so the closure
    /// must not block or touch this storage again.
    pub fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut value_ref = self.map.entry(key).or_insert_with(factory);
        accessor(&mut value_ref)
    }

    /// Access an existing entry mutably without creating it.
    pub fn with_existing_mut<Q, F, R>(&self, key: &Q, accessor: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&mut V) -> R,
    {
        self.map.get_mut(key).map(|mut value_ref| accessor(&mut value_ref))
    }

    /// Clone out a value.
    pub fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.map.get(key).map(|value_ref| value_ref.value().clone())
    }

    /// Remove a key and return its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).map(|(_, value)| value)
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Iterate over all entries.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for entry in self.map.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// Retain only the entries that satisfy the predicate, returning how many were removed.
    pub fn retain<F>(&self, f: F) -> usize
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let before = self.map.len();
        self.map.retain(f);
        before.saturating_sub(self.map.len())
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ShardedStorage<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedStorage")
            .field("len", &self.map.len())
            .finish()
    }
}
