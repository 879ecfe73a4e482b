/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! In-memory overlay over the pending writes of a [batch](super::Batch).

use std::collections::HashMap;

use crate::types::CacheKey;

/// Last-write-wins overlay mapping [cache keys](CacheKey) to pending values.
///
/// The cache answers "what is the current value of this key, counting every write staged so far"
/// without replaying the write queue: a `Put` overwrites the entry, a `Delete` evicts it. Cloning
/// the cache is how the [cached batch](super::CachedBatch) captures the state of a snapshot.
#[derive(Clone, Default)]
pub struct KVCache {
    cache: HashMap<CacheKey, Vec<u8>>,
}

impl KVCache {
    /// Create an empty cache.
    pub fn new() -> KVCache {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get the pending value under `key`, if one exists.
    pub fn read(&self, key: &CacheKey) -> Option<&Vec<u8>> {
        self.cache.get(key)
    }

    /// Insert or overwrite the pending value under `key`.
    pub fn write(&mut self, key: CacheKey, value: Vec<u8>) {
        self.cache.insert(key, value);
    }

    /// Insert the pending value under `key` only if no entry exists. Returns whether the value
    /// was written.
    pub fn write_if_absent(&mut self, key: CacheKey, value: Vec<u8>) -> bool {
        if self.cache.contains_key(&key) {
            return false;
        }
        self.cache.insert(key, value);
        true
    }

    /// Remove the entry under `key`, if one exists.
    pub fn evict(&mut self, key: &CacheKey) {
        self.cache.remove(key);
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.cache.clear()
    }

    /// Get the number of entries currently in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check whether the cache is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
