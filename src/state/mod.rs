/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Staged, revertible state writes in front of a persistent store.
//!
//! State mutations produced by executing the actions of accepted blocks do not hit the persistent
//! store directly. They accumulate in a [`CachedBatch`]: an ordered write queue paired with a
//! read-through cache, with a stack of snapshots that lets consensus speculate on a proposal and
//! roll the whole batch back if the proposal fails validation.
//!
//! Once a block is final, the batch is drained into the [persistent store](PersistentStore) in a
//! single atomic commit.

pub mod batch;
pub use batch::{Batch, BatchError, CachedBatch, PersistentStore, WriteEntry, WriteOp};

pub mod cache;
pub use cache::KVCache;
