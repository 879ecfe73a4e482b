/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Catching up with the head of the chain after falling behind.
//!
//! A node might be lagging behind for various reasons, such as network outage, downtime, or
//! simply having just joined the chain. The block sync subsystem recovers the missing blocks
//! from the node's neighbors:
//!
//! 1. The [`BlockBuffer`] holds blocks that arrived ahead of the confirmed chain tip and computes
//!    the height intervals that are still missing.
//! 2. The [`SyncWorker`] periodically inspects the buffer and unicasts a
//!    [`BlockSyncRequest`](crate::messages::BlockSyncRequest) per missing interval, rotating
//!    through the current peer list round-robin.
//!
//! Responses flow back through the [dispatcher](crate::dispatcher) as synced-block events; the
//! subscriber validates each block and inserts it into the buffer, shrinking the missing
//! intervals until the buffer is contiguous up to the sync target.

pub mod buffer;
pub use buffer::{BlockBuffer, HeightInterval};

pub mod worker;
pub use worker::{SyncWorker, SyncWorkerHandle};
