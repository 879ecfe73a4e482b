/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The staged write queue and the snapshot-capable cached batch built on top of it.
//!
//! ## Write queue
//!
//! A [`Batch`] stages `Put`/`PutIfAbsent`/`Delete` entries in sequential order. The queue is the
//! authoritative commit log: entries are applied to the [persistent store](PersistentStore) in
//! exactly the order they were staged.
//!
//! ## Cached batch
//!
//! A [`CachedBatch`] pairs the write queue with a [read-through cache](super::KVCache) for fast
//! retrieval of pending values, and a stack of snapshots. Taking a [snapshot](CachedBatch::snapshot)
//! records the queue length and a deep clone of the cache; [reverting](CachedBatch::revert)
//! truncates the queue and restores the recorded cache, discarding every later snapshot. This is
//! the substrate on which consensus speculates: execute a proposal against the batch, and revert
//! if the proposal fails.
//!
//! ## Commit
//!
//! [`CachedBatch::commit_into`] drains the queue into a [`PersistentStore`]. On success the batch
//! is cleared; on failure it is preserved unchanged, so the caller may retry.

use std::fmt::{self, Display, Formatter};

use parking_lot::RwLock;

use crate::metrics::{SNAPSHOT_COUNTER, SNAPSHOT_GAUGE};
use crate::types::CacheKey;

use super::cache::KVCache;

/// Kind of a staged write operation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WriteOp {
    Put,
    Delete,
    PutIfAbsent,
}

/// One staged write operation, identified by `(namespace, key)`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WriteEntry {
    pub op: WriteOp,
    pub namespace: String,
    pub key: Vec<u8>,
    /// The staged value. Empty for `Delete` entries.
    pub value: Vec<u8>,
    /// Message to attach to the error reported by the persistent store if applying this entry
    /// fails during commit.
    pub error_message: String,
}

/// Ordered queue of [write entries](WriteEntry) staged for a single atomic commit.
#[derive(Clone, Default)]
pub struct Batch {
    write_queue: Vec<WriteEntry>,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Batch {
        Self {
            write_queue: Vec::new(),
        }
    }

    /// Stage a write of `value` under `(namespace, key)`.
    pub fn put(&mut self, namespace: &str, key: &[u8], value: &[u8], error_message: &str) {
        self.stage(WriteOp::Put, namespace, key, value, error_message)
    }

    /// Stage a write of `value` under `(namespace, key)`, recorded as conditional on the key not
    /// existing at the time of staging.
    pub fn put_if_absent(&mut self, namespace: &str, key: &[u8], value: &[u8], error_message: &str) {
        self.stage(WriteOp::PutIfAbsent, namespace, key, value, error_message)
    }

    /// Stage a deletion of `(namespace, key)`.
    pub fn delete(&mut self, namespace: &str, key: &[u8], error_message: &str) {
        self.stage(WriteOp::Delete, namespace, key, &[], error_message)
    }

    /// Get the number of entries currently staged.
    pub fn size(&self) -> usize {
        self.write_queue.len()
    }

    /// Get the entry at `index`, if the index is in range.
    pub fn entry(&self, index: usize) -> Option<&WriteEntry> {
        self.write_queue.get(index)
    }

    /// Get the staged entries in commit order.
    pub fn entries(&self) -> &[WriteEntry] {
        &self.write_queue
    }

    /// Remove every staged entry.
    pub fn clear(&mut self) {
        self.write_queue.clear()
    }

    /// Truncate the queue to its first `size` entries.
    pub(crate) fn truncate(&mut self, size: usize) {
        self.write_queue.truncate(size)
    }

    fn stage(&mut self, op: WriteOp, namespace: &str, key: &[u8], value: &[u8], error_message: &str) {
        self.write_queue.push(WriteEntry {
            op,
            namespace: namespace.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
            error_message: error_message.to_string(),
        })
    }
}

/// The store that a [`CachedBatch`] is eventually committed into.
///
/// Implementations must apply the batch atomically: either every entry is applied, or none is.
/// On failure the implementation must not have mutated any state visible to subsequent commits,
/// so that the caller can retry the same batch.
pub trait PersistentStore {
    type Error;

    /// Atomically apply `entries` in order.
    fn commit(&mut self, entries: &[WriteEntry]) -> Result<(), Self::Error>;
}

/// A [`Batch`] paired with a read-through [`KVCache`] and a stack of revertible snapshots.
///
/// All mutating operations acquire the batch's exclusive lock; [`get`](Self::get) acquires the
/// shared lock. A batch instance is meant to back a single transaction's execution and is not
/// shared across transactions.
pub struct CachedBatch {
    inner: RwLock<Inner>,
}

struct Inner {
    batch: Batch,
    cache: KVCache,
    /// Latest snapshot token + 1. Equivalently: the number of live snapshots.
    tag: usize,
    /// Per snapshot, the length of the write queue at the time the snapshot was taken.
    batch_shots: Vec<usize>,
    /// Per snapshot, a deep clone of the cache at the time the snapshot was taken.
    cache_shots: Vec<KVCache>,
}

impl Default for CachedBatch {
    fn default() -> Self {
        CachedBatch::new()
    }
}

impl CachedBatch {
    /// Create an empty cached batch with no snapshots.
    pub fn new() -> CachedBatch {
        Self {
            inner: RwLock::new(Inner {
                batch: Batch::new(),
                cache: KVCache::new(),
                tag: 0,
                batch_shots: Vec::new(),
                cache_shots: Vec::new(),
            }),
        }
    }

    /// Stage a write of `value` under `(namespace, key)` and update the cache entry.
    pub fn put(&self, namespace: &str, key: &[u8], value: &[u8], error_message: &str) {
        let mut inner = self.inner.write();
        let cache_key = CacheKey::digest(namespace, key);
        inner.cache.write(cache_key, value.to_vec());
        inner.batch.put(namespace, key, value, error_message);
    }

    /// Stage a write of `value` under `(namespace, key)`, failing with
    /// [`BatchError::AlreadyExists`] if the key currently exists.
    ///
    /// "Currently exists" is decided by the cache overlay alone: a key whose latest staged
    /// operation is a `Delete` has no overlay entry, is therefore absent, and may be re-inserted.
    /// The commit log then carries both the deletion and the conditional insertion, in order. The
    /// overlay never consults the persistent store; a key that exists only in the store is the
    /// caller's responsibility to check before staging.
    pub fn put_if_absent(
        &self,
        namespace: &str,
        key: &[u8],
        value: &[u8],
        error_message: &str,
    ) -> Result<(), BatchError> {
        let mut inner = self.inner.write();
        let cache_key = CacheKey::digest(namespace, key);
        if !inner.cache.write_if_absent(cache_key, value.to_vec()) {
            return Err(BatchError::AlreadyExists {
                namespace: namespace.to_string(),
                key: key.to_vec(),
            });
        }
        inner.batch.put_if_absent(namespace, key, value, error_message);
        Ok(())
    }

    /// Stage a deletion of `(namespace, key)` and evict the cache entry.
    pub fn delete(&self, namespace: &str, key: &[u8], error_message: &str) {
        let mut inner = self.inner.write();
        let cache_key = CacheKey::digest(namespace, key);
        inner.cache.evict(&cache_key);
        inner.batch.delete(namespace, key, error_message);
    }

    /// Get the pending value under `(namespace, key)`, failing with [`BatchError::NotFound`] if
    /// the cache has no entry for it.
    ///
    /// The batch answers only for its own pending writes; consulting the persistent store on a
    /// miss is the caller's job.
    pub fn get(&self, namespace: &str, key: &[u8]) -> Result<Vec<u8>, BatchError> {
        let inner = self.inner.read();
        let cache_key = CacheKey::digest(namespace, key);
        match inner.cache.read(&cache_key) {
            Some(value) => Ok(value.clone()),
            None => Err(BatchError::NotFound {
                namespace: namespace.to_string(),
                key: key.to_vec(),
            }),
        }
    }

    /// Take a snapshot of the current batch, returning its token.
    ///
    /// Tokens form a strictly ascending integer sequence starting at 0 and restarting at 0 after
    /// [`clear`](Self::clear). The snapshot captures the write queue length and a deep clone of
    /// the cache, under the exclusive lock, so snapshot creation is linearizable with writes.
    pub fn snapshot(&self) -> usize {
        SNAPSHOT_COUNTER.with_label_values(&["snapshot"]).inc();
        let mut inner = self.inner.write();
        let queue_size = inner.batch.size();
        let cache_clone = inner.cache.clone();
        inner.batch_shots.push(queue_size);
        inner.cache_shots.push(cache_clone);

        SNAPSHOT_GAUGE
            .with_label_values(&["batch_size"])
            .set(inner.batch_shots.len() as i64);
        SNAPSHOT_GAUGE
            .with_label_values(&["cache_size"])
            .set(inner.cache_shots.len() as i64);

        let token = inner.tag;
        inner.tag += 1;
        token
    }

    /// Restore the batch to the exact state observed immediately after snapshot `token` was
    /// taken: the write queue is truncated to the recorded length, the recorded cache is
    /// restored, and every snapshot taken after `token` is discarded. `token` itself remains
    /// valid, so the same state can be restored again.
    ///
    /// Fails with [`BatchError::InvalidSnapshot`] if `token` does not identify a live snapshot.
    pub fn revert(&self, token: usize) -> Result<(), BatchError> {
        SNAPSHOT_COUNTER.with_label_values(&["revert"]).inc();
        let mut inner = self.inner.write();
        if token >= inner.tag {
            return Err(BatchError::InvalidSnapshot { token });
        }
        inner.tag = token + 1;
        let tag = inner.tag;
        inner.batch_shots.truncate(tag);
        inner.cache_shots.truncate(tag);
        let queue_size = inner.batch_shots[token];
        inner.batch.truncate(queue_size);
        inner.cache = inner.cache_shots[token].clone();
        Ok(())
    }

    /// Remove every staged entry, every cache entry, and every snapshot. The next snapshot token
    /// handed out will be 0 again.
    pub fn clear(&self) {
        SNAPSHOT_COUNTER.with_label_values(&["clear"]).inc();
        self.inner.write().reset()
    }

    /// Get the number of entries currently staged in the write queue.
    pub fn size(&self) -> usize {
        self.inner.read().batch.size()
    }

    /// Get a copy of the staged entries in commit order.
    pub fn entries(&self) -> Vec<WriteEntry> {
        self.inner.read().batch.entries().to_vec()
    }

    /// Drain the staged entries into `store` in a single atomic commit.
    ///
    /// On success the batch is cleared (queue, cache, and snapshots). On failure the batch is
    /// preserved unchanged so the caller may retry. The store commit runs outside the batch's
    /// lock; the batch backs a single transaction, so no concurrent writer can interleave between
    /// the entry copy and the clear.
    pub fn commit_into<S: PersistentStore>(&self, store: &mut S) -> Result<(), S::Error> {
        let entries = self.inner.read().batch.entries().to_vec();
        store.commit(&entries)?;
        SNAPSHOT_COUNTER.with_label_values(&["clearAndUnlock"]).inc();
        self.inner.write().reset();
        Ok(())
    }
}

impl Inner {
    fn reset(&mut self) {
        self.cache.clear();
        self.batch.clear();
        self.tag = 0;
        self.batch_shots.clear();
        self.cache_shots.clear();
    }
}

/// Error when operating on a [`Batch`] or [`CachedBatch`].
#[derive(Debug, PartialEq, Eq)]
pub enum BatchError {
    /// `put_if_absent` found an existing entry for the key.
    AlreadyExists { namespace: String, key: Vec<u8> },

    /// `get` found no pending entry for the key.
    NotFound { namespace: String, key: Vec<u8> },

    /// `revert` was given a token that does not identify a live snapshot.
    InvalidSnapshot { token: usize },
}

impl Display for BatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::AlreadyExists { namespace, key } => {
                write!(f, "key {:?} already exists in namespace {}", key, namespace)
            }
            BatchError::NotFound { namespace, key } => {
                write!(f, "key {:?} not found in namespace {}", key, namespace)
            }
            BatchError::InvalidSnapshot { token } => {
                write!(f, "invalid snapshot number = {}", token)
            }
        }
    }
}

impl std::error::Error for BatchError {}
