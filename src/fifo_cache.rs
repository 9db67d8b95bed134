//! # FIFO Cache
//!
//! A capacity-bounded map that evicts by insertion order.
//! Used by the route cache for its in-memory backend and for entries that
//! could not be written to persisted storage.

use std::collections::HashMap;
use std::hash::Hash;

/// A bounded cache with O(n) eviction of the oldest-inserted entry.
///
/// Reads never refresh an entry's position. Re-inserting an existing key
/// replaces the value and makes it the newest entry.
#[derive(Debug)]
pub struct FifoCache<K, V> {
    capacity: usize,
    entries: HashMap<K, CacheEntry<V>>,
    insert_counter: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted: u64,
}

impl<K: Eq + Hash + Clone, V> FifoCache<K, V> {
    /// Create a new cache with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            insert_counter: 0,
        }
    }

    /// Get a value without affecting eviction order.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Insert a value, evicting the oldest entry if at capacity.
    ///
    /// Returns the key that was evicted to make room, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        self.insert_counter += 1;

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted = self.insert_counter;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted: self.insert_counter,
            },
        );
        evicted
    }

    /// Remove a specific key, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Clear all entries from the cache.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.insert_counter = 0;
    }

    /// Get the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the cache contains a key.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over all values in arbitrary order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|entry| &entry.value)
    }

    /// Iterate over all key/value pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, entry)| (k, &entry.value))
    }

    /// Evict the oldest-inserted entry.
    fn evict_oldest(&mut self) -> Option<K> {
        let oldest_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted)
            .map(|(k, _)| k.clone())?;

        self.entries.remove(&oldest_key);
        Some(oldest_key)
    }
}

impl<K: Eq + Hash + Clone, V> Default for FifoCache<K, V> {
    fn default() -> Self {
        Self::new(100)
    }
}
