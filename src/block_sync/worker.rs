/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The recurring task that requests missing blocks from neighbors.
//!
//! On each tick the worker snapshots the current peer list, asks the [block
//! buffer](super::BlockBuffer) for the height intervals still missing below the sync target, and
//! unicasts one [`BlockSyncRequest`] per interval, rotating through the peers round-robin so that
//! no single neighbor serves every request.
//!
//! Requests are fire-and-forget: a response that never arrives simply leaves its interval
//! missing, and the next tick re-requests it from the next peer in the rotation.
//!
//! The sync target is the highest block height the node has evidence for, fed in through
//! [`SyncWorkerHandle::set_target_height`] by whoever observes that evidence (typically the
//! subscriber, when it sees a block ahead of the local tip).

use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::BlockSyncConfiguration;
use crate::messages::BlockSyncRequest;
use crate::networking::Network;
use crate::types::{BlockHeight, ChainID};

use super::buffer::BlockBuffer;

/// The recurring gap-fill requester. Created by [`new`](Self::new), driven by a dedicated thread
/// spawned by [`start`](Self::start).
pub struct SyncWorker<N: Network> {
    config: BlockSyncConfiguration,
    chain_id: ChainID,
    state: Arc<Mutex<SyncWorkerState>>,
    buffer: Arc<Mutex<BlockBuffer>>,
    network: N,
    shutdown_signal: Receiver<()>,
}

struct SyncWorkerState {
    target_height: BlockHeight,
    rr_idx: usize,
}

impl<N: Network> SyncWorker<N> {
    pub fn new(
        config: BlockSyncConfiguration,
        chain_id: ChainID,
        buffer: Arc<Mutex<BlockBuffer>>,
        network: N,
        shutdown_signal: Receiver<()>,
    ) -> Self {
        Self {
            config,
            chain_id,
            state: Arc::new(Mutex::new(SyncWorkerState {
                target_height: BlockHeight::new(0),
                rr_idx: 0,
            })),
            buffer,
            network,
            shutdown_signal,
        }
    }

    /// Get a handle for feeding the worker its sync target from other threads.
    pub fn handle(&self) -> SyncWorkerHandle {
        SyncWorkerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Start the worker thread, which runs until a shutdown signal is received from the parent
    /// thread, ticking every [`interval`](BlockSyncConfiguration::interval).
    pub fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut last_tick = Instant::now();
            loop {
                match self.shutdown_signal.try_recv() {
                    Ok(()) => return,
                    Err(TryRecvError::Empty) => (),
                    Err(TryRecvError::Disconnected) => {
                        unreachable!("the sync worker's `shutdown_signal` channel no longer has any senders connected to it")
                    }
                }

                if Instant::now() - last_tick >= self.config.interval {
                    self.sync();
                    last_tick = Instant::now();
                }

                thread::yield_now();
            }
        })
    }

    /// One tick: check the sliding window and send more sync requests if needed.
    fn sync(&mut self) {
        let peers = self.network.neighbors();
        if peers.is_empty() {
            log::debug!("no peers exist to sync with");
            return;
        }

        let mut state = self.state.lock();
        let intervals = self.buffer.lock().missing_intervals(state.target_height);
        if !intervals.is_empty() {
            log::info!(
                "block sync intervals: {:?}, target height: {}",
                intervals,
                state.target_height,
            );
        }
        for interval in intervals {
            state.rr_idx %= peers.len();
            let peer = peers[state.rr_idx];
            self.network.send(
                peer,
                BlockSyncRequest {
                    chain_id: self.chain_id,
                    start: interval.start,
                    end: interval.end,
                }
                .into(),
            );
            state.rr_idx += 1;
        }
    }
}

/// Cloneable handle onto a [`SyncWorker`]'s target height.
#[derive(Clone)]
pub struct SyncWorkerHandle {
    state: Arc<Mutex<SyncWorkerState>>,
}

impl SyncWorkerHandle {
    /// Raise the worker's sync target to `height`. Targets at or below the current one are
    /// ignored, so the target only ever moves forward.
    pub fn set_target_height(&self, height: BlockHeight) {
        let mut state = self.state.lock();
        if height > state.target_height {
            state.target_height = height;
        }
    }

    /// Get the current sync target.
    pub fn target_height(&self) -> BlockHeight {
        self.state.lock().target_height
    }
}
