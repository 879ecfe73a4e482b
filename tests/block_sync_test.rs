/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for block sync: the buffer's missing-interval computation and draining, the worker's
//! round-robin requesting, and a two-node sync session over a mock network.

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::LevelFilter;
use parking_lot::Mutex;

use polychain_core::block_sync::{BlockBuffer, HeightInterval, SyncWorker};
use polychain_core::config::{BlockSyncConfiguration, Configuration, DispatcherConfiguration};
use polychain_core::dispatcher::{Subscriber, SubscriberError};
use polychain_core::messages::{
    Action, Block, BlockSyncRequest, BlockSyncResponse, ConsensusMessage, Message,
};
use polychain_core::networking::Network;
use polychain_core::node::Node;
use polychain_core::types::{BlockHeight, ChainID, CryptoHash, VerifyingKey};

use common::{keypairs, mock_network, setup_logger};

const CHAIN: ChainID = ChainID::new(1);

fn block(height: u64) -> Block {
    Block {
        chain_id: CHAIN,
        height: BlockHeight::new(height),
        hash: CryptoHash::new([height as u8; 32]),
        data: Vec::new(),
    }
}

fn interval(start: u64, end: u64) -> HeightInterval {
    HeightInterval {
        start: BlockHeight::new(start),
        end: BlockHeight::new(end),
    }
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for: {}", what);
}

#[test]
fn missing_intervals_around_buffered_blocks() {
    let mut buffer = BlockBuffer::new(BlockHeight::new(10), 16, 5);
    assert!(buffer.insert(block(13)));
    assert!(buffer.insert(block(14)));
    assert!(buffer.insert(block(17)));

    assert_eq!(
        buffer.missing_intervals(BlockHeight::new(20)),
        vec![interval(11, 12), interval(15, 16), interval(18, 20)]
    );
}

#[test]
fn wide_gaps_are_split_at_the_window_bound() {
    let buffer = BlockBuffer::new(BlockHeight::new(10), 16, 5);
    assert_eq!(
        buffer.missing_intervals(BlockHeight::new(22)),
        vec![interval(11, 15), interval(16, 20), interval(21, 22)]
    );
}

#[test]
fn targets_are_clamped_to_the_buffer_bound() {
    let buffer = BlockBuffer::new(BlockHeight::new(0), 4, 10);
    assert_eq!(
        buffer.missing_intervals(BlockHeight::new(100)),
        vec![interval(1, 4)]
    );
}

#[test]
fn contiguous_buffers_need_nothing() {
    let mut buffer = BlockBuffer::new(BlockHeight::new(10), 16, 5);
    for height in 11..=15 {
        assert!(buffer.insert(block(height)));
    }
    assert!(buffer.missing_intervals(BlockHeight::new(15)).is_empty());

    // A target at or below the tip needs nothing either.
    assert!(buffer.missing_intervals(BlockHeight::new(10)).is_empty());
    assert!(buffer.missing_intervals(BlockHeight::new(3)).is_empty());
}

#[test]
fn insert_rejects_stale_distant_and_duplicate_blocks() {
    let mut buffer = BlockBuffer::new(BlockHeight::new(10), 4, 5);

    assert!(!buffer.insert(block(10)), "at the tip");
    assert!(!buffer.insert(block(5)), "below the tip");
    assert!(!buffer.insert(block(15)), "beyond tip + buffer_size");

    assert!(buffer.insert(block(12)));
    assert!(!buffer.insert(block(12)), "already buffered");
    assert_eq!(buffer.len(), 1);
}

#[test]
fn pop_ready_drains_the_consecutive_run_above_the_tip() {
    let mut buffer = BlockBuffer::new(BlockHeight::new(10), 16, 5);
    buffer.insert(block(11));
    buffer.insert(block(12));
    buffer.insert(block(14));

    let ready = buffer.pop_ready();
    let heights: Vec<u64> = ready.iter().map(|b| b.height.int()).collect();
    assert_eq!(heights, vec![11, 12]);
    assert_eq!(buffer.confirmed_height(), BlockHeight::new(12));
    assert_eq!(buffer.len(), 1);

    // Block 13 is still missing, so nothing more drains.
    assert!(buffer.pop_ready().is_empty());

    buffer.insert(block(13));
    let heights: Vec<u64> = buffer.pop_ready().iter().map(|b| b.height.int()).collect();
    assert_eq!(heights, vec![13, 14]);
}

#[test]
fn confirming_heights_externally_prunes_the_buffer() {
    let mut buffer = BlockBuffer::new(BlockHeight::new(10), 16, 5);
    for height in 11..=15 {
        buffer.insert(block(height));
    }

    buffer.set_confirmed_height(BlockHeight::new(13));
    assert_eq!(buffer.confirmed_height(), BlockHeight::new(13));
    assert_eq!(buffer.len(), 2);

    // Heights at or below the tip are ignored.
    buffer.set_confirmed_height(BlockHeight::new(12));
    assert_eq!(buffer.confirmed_height(), BlockHeight::new(13));
}

#[test]
fn worker_rotates_requests_through_peers_round_robin() {
    setup_logger(LevelFilter::Debug);

    let keys: Vec<VerifyingKey> = keypairs(4).iter().map(|kp| kp.verifying_key()).collect();
    let stubs = mock_network(&keys);
    let my_stub = stubs[0].clone();
    let (peer_1, peer_2, peer_3) = (keys[1], keys[2], keys[3]);

    let buffer = Arc::new(Mutex::new(BlockBuffer::new(BlockHeight::new(10), 16, 5)));
    {
        let mut buffer = buffer.lock();
        buffer.insert(block(13));
        buffer.insert(block(14));
        buffer.insert(block(17));
    }

    let config = BlockSyncConfiguration {
        interval: Duration::from_millis(25),
        buffer_size: 16,
        max_window: 5,
    };
    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    let worker = SyncWorker::new(
        config,
        CHAIN,
        Arc::clone(&buffer),
        my_stub.clone(),
        shutdown_receiver,
    );
    let handle = worker.handle();

    // The target only moves forward.
    handle.set_target_height(BlockHeight::new(20));
    handle.set_target_height(BlockHeight::new(15));
    assert_eq!(handle.target_height(), BlockHeight::new(20));

    let worker = worker.start();
    wait_until("two full rounds of sync requests", || {
        my_stub.sent().len() >= 6
    });
    shutdown_sender.send(()).unwrap();
    worker.join().unwrap();

    let request = |start: u64, end: u64| {
        Message::BlockSyncRequest(BlockSyncRequest {
            chain_id: CHAIN,
            start: BlockHeight::new(start),
            end: BlockHeight::new(end),
        })
    };
    let sent = my_stub.sent();
    assert_eq!(sent[0], (peer_1, request(11, 12)));
    assert_eq!(sent[1], (peer_2, request(15, 16)));
    assert_eq!(sent[2], (peer_3, request(18, 20)));

    // The next tick re-requests the same intervals, continuing the rotation.
    assert_eq!(sent[3], (peer_1, request(11, 12)));
    assert_eq!(sent[4], (peer_2, request(15, 16)));
    assert_eq!(sent[5], (peer_3, request(18, 20)));
}

#[test]
fn worker_stays_quiet_without_peers() {
    setup_logger(LevelFilter::Debug);

    let keys: Vec<VerifyingKey> = keypairs(1).iter().map(|kp| kp.verifying_key()).collect();
    let my_stub = mock_network(&keys).remove(0);

    let buffer = Arc::new(Mutex::new(BlockBuffer::new(BlockHeight::new(10), 16, 5)));
    let config = BlockSyncConfiguration {
        interval: Duration::from_millis(25),
        buffer_size: 16,
        max_window: 5,
    };
    let (shutdown_sender, shutdown_receiver) = mpsc::channel();
    let worker = SyncWorker::new(
        config,
        CHAIN,
        buffer,
        my_stub.clone(),
        shutdown_receiver,
    );
    worker.handle().set_target_height(BlockHeight::new(20));

    let worker = worker.start();
    thread::sleep(Duration::from_millis(200));
    shutdown_sender.send(()).unwrap();
    worker.join().unwrap();

    assert!(my_stub.sent().is_empty());
}

/// A subscriber that inserts synced blocks into the node's block buffer.
struct SyncingSubscriber {
    buffer: Arc<Mutex<BlockBuffer>>,
}

impl Subscriber for SyncingSubscriber {
    fn handle_action(&self, _: Action) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn handle_block(&self, _: Block) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn handle_block_sync(&self, block: Block) -> Result<(), SubscriberError> {
        self.buffer.lock().insert(block);
        Ok(())
    }

    fn handle_sync_request(&self, _: VerifyingKey, _: BlockSyncRequest) -> Result<(), SubscriberError> {
        Ok(())
    }

    fn handle_consensus_msg(&self, _: ConsensusMessage) -> Result<(), SubscriberError> {
        Ok(())
    }
}

#[test]
fn a_lagging_node_catches_up_through_sync() {
    setup_logger(LevelFilter::Debug);

    let keys: Vec<VerifyingKey> = keypairs(2).iter().map(|kp| kp.verifying_key()).collect();
    let mut stubs = mock_network(&keys);
    let node_key = keys[0];
    let mut peer_stub = stubs.remove(1);
    let node_stub = stubs.remove(0);

    let config = Configuration {
        dispatcher: DispatcherConfiguration::default(),
        block_sync: BlockSyncConfiguration {
            interval: Duration::from_millis(25),
            buffer_size: 16,
            max_window: 5,
        },
    };
    let node = Node::start(config, CHAIN, node_stub, BlockHeight::new(10)).unwrap();
    node.add_subscriber(
        CHAIN,
        Arc::new(SyncingSubscriber {
            buffer: Arc::clone(node.block_buffer()),
        }),
    );
    node.sync_worker()
        .unwrap()
        .set_target_height(BlockHeight::new(13));

    // Serve sync requests from the peer until the node's buffer is contiguous up to the target.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if node
            .block_buffer()
            .lock()
            .missing_intervals(BlockHeight::new(13))
            .is_empty()
        {
            break;
        }
        assert!(Instant::now() < deadline, "node did not catch up in time");

        if let Some((_, Message::BlockSyncRequest(request))) = peer_stub.recv() {
            for height in request.start.int()..=request.end.int() {
                peer_stub.send(
                    node_key,
                    Message::BlockSyncResponse(BlockSyncResponse {
                        block: block(height),
                    }),
                );
            }
        } else {
            thread::sleep(Duration::from_millis(5));
        }
    }

    let heights: Vec<u64> = node
        .block_buffer()
        .lock()
        .pop_ready()
        .iter()
        .map(|b| b.height.int())
        .collect();
    assert_eq!(heights, vec![11, 12, 13]);
    assert_eq!(
        node.block_buffer().lock().confirmed_height(),
        BlockHeight::new(13)
    );
}
