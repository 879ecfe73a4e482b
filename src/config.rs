/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration as specified by the operator. This is split up into smaller, subsystem specific
//! config structs before being passed to components.

use std::time::Duration;

/// Configuration for all core subsystems of the node.
#[derive(Clone)]
pub struct Configuration {
    pub dispatcher: DispatcherConfiguration,
    pub block_sync: BlockSyncConfiguration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfiguration::default(),
            block_sync: BlockSyncConfiguration::default(),
        }
    }
}

/// Parameters that define the behaviour of the [`Dispatcher`](crate::dispatcher::Dispatcher).
/// These should not change after the dispatcher starts.
#[derive(Clone)]
pub struct DispatcherConfiguration {
    /// Capacity of the bounded event queue. When the queue is at capacity, further events are
    /// dropped with a warning instead of blocking the producer.
    pub event_chan_size: usize,
}

impl Default for DispatcherConfiguration {
    fn default() -> Self {
        Self {
            event_chan_size: 10000,
        }
    }
}

/// Parameters that define the behaviour of the block sync subsystem: the
/// [`BlockBuffer`](crate::block_sync::BlockBuffer) and the
/// [`SyncWorker`](crate::block_sync::SyncWorker). These should not change after the worker starts.
#[derive(Clone)]
pub struct BlockSyncConfiguration {
    /// Period of the sync worker's recurring tick. A zero interval disables the worker entirely.
    pub interval: Duration,

    /// Maximum number of blocks buffered ahead of the confirmed chain tip. Blocks beyond
    /// `tip + buffer_size` are not buffered, and sync requests are never issued past that bound.
    pub buffer_size: u64,

    /// Upper bound on the width of a single requested sync interval.
    pub max_window: u64,
}

impl Default for BlockSyncConfiguration {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            buffer_size: 16,
            max_window: 8,
        }
    }
}
