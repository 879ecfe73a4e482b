/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Holding area for blocks received ahead of the confirmed chain tip.

use std::collections::BTreeMap;

use crate::logging::short_hash;
use crate::messages::Block;
use crate::types::BlockHeight;

/// An inclusive, non-empty range of block heights that the node still needs to fetch.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HeightInterval {
    pub start: BlockHeight,
    pub end: BlockHeight,
}

/// Out-of-order holding area for blocks above the confirmed chain tip.
///
/// The buffer accepts blocks whose heights lie in `(tip, tip + buffer_size]` and keeps them keyed
/// by height. Its two jobs:
/// - [`missing_intervals`](Self::missing_intervals) tells the [sync
///   worker](super::SyncWorker) which height ranges still need to be requested.
/// - [`pop_ready`](Self::pop_ready) hands the chain the consecutive run of blocks starting right
///   above the tip, once sync has filled the gaps.
///
/// The buffer does not validate blocks; the subscriber decides what is inserted.
pub struct BlockBuffer {
    blocks: BTreeMap<u64, Block>,
    confirmed_height: BlockHeight,
    buffer_size: u64,
    max_window: u64,
}

impl BlockBuffer {
    /// Create an empty buffer on top of the confirmed tip `confirmed_height`.
    ///
    /// `buffer_size` bounds how far above the tip blocks are buffered, and `max_window` bounds
    /// the width of a single interval returned by [`missing_intervals`](Self::missing_intervals).
    pub fn new(confirmed_height: BlockHeight, buffer_size: u64, max_window: u64) -> BlockBuffer {
        Self {
            blocks: BTreeMap::new(),
            confirmed_height,
            buffer_size,
            // A zero-width window could never make progress.
            max_window: max_window.max(1),
        }
    }

    /// Get the confirmed chain tip the buffer currently sits on.
    pub fn confirmed_height(&self) -> BlockHeight {
        self.confirmed_height
    }

    /// Get the number of blocks currently buffered.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check whether the buffer is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Insert a block into the buffer. Returns whether the block was buffered.
    ///
    /// Blocks at or below the confirmed tip, beyond `tip + buffer_size`, or at an
    /// already-buffered height are not buffered.
    pub fn insert(&mut self, block: Block) -> bool {
        let height = block.height.int();
        if height <= self.confirmed_height.int() {
            return false;
        }
        if height > self.confirmed_height.int() + self.buffer_size {
            log::debug!(
                "block {} at height {} is beyond the buffer bound, not buffering",
                short_hash(&block.hash),
                block.height,
            );
            return false;
        }
        if self.blocks.contains_key(&height) {
            return false;
        }
        self.blocks.insert(height, block);
        true
    }

    /// Remove and return the consecutive run of blocks starting at `tip + 1`, in ascending height
    /// order, advancing the confirmed tip past them. Returns an empty vector when the block at
    /// `tip + 1` has not arrived yet.
    pub fn pop_ready(&mut self) -> Vec<Block> {
        let mut ready = Vec::new();
        let mut next = self.confirmed_height.int() + 1;
        while let Some(block) = self.blocks.remove(&next) {
            ready.push(block);
            next += 1;
        }
        self.confirmed_height = BlockHeight::new(next - 1);
        ready
    }

    /// Record that the chain has confirmed blocks up to `height` through some other path, pruning
    /// buffered blocks that are no longer above the tip. Heights at or below the current tip are
    /// ignored.
    pub fn set_confirmed_height(&mut self, height: BlockHeight) {
        if height <= self.confirmed_height {
            return;
        }
        self.confirmed_height = height;
        self.blocks = self.blocks.split_off(&(height.int() + 1));
    }

    /// Compute the sorted, pairwise disjoint list of height intervals that are missing between
    /// the confirmed tip and `target_height`.
    ///
    /// The target is clamped to `tip + buffer_size`, so the node never requests blocks it could
    /// not buffer. Runs of missing heights wider than `max_window` are split into several
    /// intervals. Returns an empty list when the buffer is contiguous from `tip + 1` through the
    /// target, or when the target does not exceed the tip.
    pub fn missing_intervals(&self, target_height: BlockHeight) -> Vec<HeightInterval> {
        let confirmed = self.confirmed_height.int();
        let mut target = target_height.int();
        if target <= confirmed {
            return Vec::new();
        }
        if target > confirmed + self.buffer_size {
            target = confirmed + self.buffer_size;
        }

        let mut intervals = Vec::new();
        let mut start = 0;
        let mut width = 0;
        for height in confirmed + 1..=target {
            if self.blocks.contains_key(&height) {
                if width > 0 {
                    intervals.push(HeightInterval {
                        start: BlockHeight::new(start),
                        end: BlockHeight::new(height - 1),
                    });
                    width = 0;
                }
                continue;
            }
            if width == 0 {
                start = height;
            }
            width += 1;
            if width == self.max_window {
                intervals.push(HeightInterval {
                    start: BlockHeight::new(start),
                    end: BlockHeight::new(height),
                });
                width = 0;
            }
        }
        if width > 0 {
            intervals.push(HeightInterval {
                start: BlockHeight::new(start),
                end: BlockHeight::new(target),
            });
        }
        intervals
    }
}
