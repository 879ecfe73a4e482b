/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that [start](Node::start) the core threads of a node, as well as [the type](Node)
//! which keeps them alive.
//!
//! A running node is three cooperating threads over one [`Network`] handle:
//! 1. The poller, which pumps received messages into the [dispatcher](crate::dispatcher).
//! 2. The dispatcher's consumer, which drains the event queue into the registered subscribers.
//! 3. The [sync worker](crate::block_sync::SyncWorker), which periodically requests the blocks
//!    missing from the shared [block buffer](crate::block_sync::BlockBuffer). Configuring a zero
//!    sync interval disables this thread.
//!
//! Dropping the `Node` shuts the threads down cooperatively, in dependency order: in-flight
//! subscriber calls run to completion, and no thread is cancelled mid-event.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::block_sync::{BlockBuffer, SyncWorker, SyncWorkerHandle};
use crate::config::Configuration;
use crate::dispatcher::{Dispatcher, DispatcherError, Subscriber};
use crate::networking::{start_polling, Network};
use crate::types::{BlockHeight, ChainID};

/// The running core of a node. Construct with [`start`](Self::start); threads shut down when the
/// `Node` is dropped.
pub struct Node {
    dispatcher: Arc<Dispatcher>,
    buffer: Arc<Mutex<BlockBuffer>>,
    sync_worker_handle: Option<SyncWorkerHandle>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    sync_worker: Option<JoinHandle<()>>,
    sync_worker_shutdown: Option<Sender<()>>,
}

impl Node {
    /// Start the core threads.
    ///
    /// `chain_id` identifies the home chain whose blocks the sync worker recovers, and
    /// `start_height` is the chain tip the block buffer starts on. Subscribers should be
    /// [registered](Self::add_subscriber) before peers start delivering traffic; events for
    /// unregistered chains are discarded with a log.
    pub fn start<N: Network>(
        config: Configuration,
        chain_id: ChainID,
        network: N,
        start_height: BlockHeight,
    ) -> Result<Node, DispatcherError> {
        let dispatcher = Arc::new(Dispatcher::new(&config.dispatcher));
        dispatcher.start()?;

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let poller = start_polling(
            network.clone(),
            Arc::clone(&dispatcher),
            poller_shutdown_receiver,
        );

        let buffer = Arc::new(Mutex::new(BlockBuffer::new(
            start_height,
            config.block_sync.buffer_size,
            config.block_sync.max_window,
        )));

        let (sync_worker, sync_worker_shutdown, sync_worker_handle) =
            if config.block_sync.interval.is_zero() {
                (None, None, None)
            } else {
                let (shutdown_sender, shutdown_receiver) = mpsc::channel();
                let worker = SyncWorker::new(
                    config.block_sync.clone(),
                    chain_id,
                    Arc::clone(&buffer),
                    network,
                    shutdown_receiver,
                );
                let handle = worker.handle();
                (Some(worker.start()), Some(shutdown_sender), Some(handle))
            };

        Ok(Node {
            dispatcher,
            buffer,
            sync_worker_handle,
            poller: Some(poller),
            poller_shutdown,
            sync_worker,
            sync_worker_shutdown,
        })
    }

    /// Register `subscriber` as the handler set for `chain_id`.
    pub fn add_subscriber(&self, chain_id: ChainID, subscriber: Arc<dyn Subscriber>) {
        self.dispatcher.add_subscriber(chain_id, subscriber)
    }

    /// Get the node's dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get the shared block buffer. The subscriber's sync handler inserts validated blocks here.
    pub fn block_buffer(&self) -> &Arc<Mutex<BlockBuffer>> {
        &self.buffer
    }

    /// Get the sync worker's handle, for feeding it the sync target. `None` when the worker is
    /// disabled by a zero sync interval.
    pub fn sync_worker(&self) -> Option<&SyncWorkerHandle> {
        self.sync_worker_handle.as_ref()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Shutdown order matters: the worker stops emitting requests first, then the poller stops
        // producing events, and only then is the dispatcher's consumer joined.
        if let Some(shutdown) = self.sync_worker_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(sync_worker) = self.sync_worker.take() {
            let _ = sync_worker.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }

        self.dispatcher.stop();
    }
}
