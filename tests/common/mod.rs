/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Shared fixtures for the integration test suites: a logger that prints to stdout, Ed25519
//! keypair generation, and a mock [`Network`] which passes messages from and to threads using
//! channels.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, Once};
use std::thread;

use log::LevelFilter;
use rand_core::OsRng;

use polychain_core::messages::Message;
use polychain_core::networking::Network;
use polychain_core::types::{SigningKey, VerifyingKey};

static LOGGER_INIT: Once = Once::new();

/// Set up a logger that logs all log messages with level `level` and above.
pub fn setup_logger(level: LevelFilter) {
    LOGGER_INIT.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{:?}][{}] {}",
                    thread::current().id(),
                    record.level(),
                    message
                ))
            })
            .level(level)
            .chain(io::stdout())
            .apply()
            .unwrap();
    })
}

/// Generate `n` fresh Ed25519 keypairs.
pub fn keypairs(n: usize) -> Vec<SigningKey> {
    let mut csprg = OsRng {};
    (0..n).map(|_| SigningKey::generate(&mut csprg)).collect()
}

/// A mock network stub which passes messages from and to threads using channels.
///
/// Unicast sends are additionally recorded in a log shared by all stubs of the same mock network,
/// so that tests can assert on the order and the targets of the requests a component emits.
#[derive(Clone)]
pub struct NetworkStub {
    my_public_key: VerifyingKey,
    peers: Vec<VerifyingKey>,
    outboxes: HashMap<VerifyingKey, Sender<(VerifyingKey, Message)>>,
    inbox: Arc<Mutex<Receiver<(VerifyingKey, Message)>>>,
    sent_log: Arc<Mutex<Vec<(VerifyingKey, Message)>>>,
}

impl NetworkStub {
    /// Get every unicast `(target, message)` pair sent so far through any stub of this mock
    /// network, in send order.
    pub fn sent(&self) -> Vec<(VerifyingKey, Message)> {
        self.sent_log.lock().unwrap().clone()
    }

    pub fn my_public_key(&self) -> VerifyingKey {
        self.my_public_key
    }
}

impl Network for NetworkStub {
    fn broadcast(&mut self, message: Message) {
        for outbox in self.outboxes.values() {
            let _ = outbox.send((self.my_public_key, message.clone()));
        }
    }

    fn send(&mut self, peer: VerifyingKey, message: Message) {
        self.sent_log.lock().unwrap().push((peer, message.clone()));
        if let Some(outbox) = self.outboxes.get(&peer) {
            let _ = outbox.send((self.my_public_key, message));
        }
    }

    fn neighbors(&self) -> Vec<VerifyingKey> {
        self.peers.clone()
    }

    fn recv(&mut self) -> Option<(VerifyingKey, Message)> {
        match self.inbox.lock().unwrap().try_recv() {
            Ok(origin_and_msg) => Some(origin_and_msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => panic!(),
        }
    }
}

/// Create one connected [`NetworkStub`] per public key in `peers`. Each stub's
/// [`neighbors`](Network::neighbors) lists the other peers in the order given here.
pub fn mock_network(peers: &[VerifyingKey]) -> Vec<NetworkStub> {
    let sent_log = Arc::new(Mutex::new(Vec::new()));

    let mut outboxes = HashMap::new();
    let peer_and_inboxes: Vec<(VerifyingKey, Receiver<(VerifyingKey, Message)>)> = peers
        .iter()
        .map(|peer| {
            let (sender, receiver) = mpsc::channel();
            outboxes.insert(*peer, sender);
            (*peer, receiver)
        })
        .collect();

    peer_and_inboxes
        .into_iter()
        .map(|(my_public_key, inbox)| NetworkStub {
            my_public_key,
            peers: peers
                .iter()
                .filter(|peer| **peer != my_public_key)
                .copied()
                .collect(),
            outboxes: outboxes.clone(),
            inbox: Arc::new(Mutex::new(inbox)),
            sent_log: Arc::clone(&sent_log),
        })
        .collect()
}
