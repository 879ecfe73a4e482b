/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Trait for pluggable peer-to-peer (P2P) networking, and the poller thread that feeds received
//! messages into the [dispatcher](crate::dispatcher).
//!
//! Main trait: [`Network`].

use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::dispatcher::Dispatcher;
use crate::messages::Message;
use crate::types::VerifyingKey;

/// Trait for pluggable peer-to-peer (P2P) networking.
///
/// Peers are identified by their Ed25519 public keys. Wire-level framing, transport, and peer
/// discovery are the provider's concern; the core only asks for best-effort delivery.
pub trait Network: Clone + Send + 'static {
    /// Send a message to all peers without blocking.
    fn broadcast(&mut self, message: Message);

    /// Send a message to the specified peer without blocking. Delivery is best-effort: a lost
    /// message surfaces to the caller as an absent response, never as an error.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Get the peers currently connected. The sync worker snapshots this list on every tick to
    /// rotate its unicast requests.
    fn neighbors(&self) -> Vec<VerifyingKey>;

    /// Receive a message from any peer. Returns immediately with a `None` if no message is
    /// available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}

/// Spawn the poller thread, which polls the [`Network`] for messages and hands them to the
/// [`Dispatcher`].
///
/// Gossiped message kinds (actions, blocks, consensus messages) enter through
/// [`handle_broadcast`](Dispatcher::handle_broadcast); unicast kinds (sync requests and sync
/// responses) enter through [`handle_tell`](Dispatcher::handle_tell), which retains the origin
/// so that the reply can be addressed.
pub fn start_polling<N: Network>(
    mut network: N,
    dispatcher: Arc<Dispatcher>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) => return,
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => {
                unreachable!("the poller's `shutdown_signal` channel no longer has any senders connected to it")
            }
        }

        if let Some((origin, msg)) = network.recv() {
            let chain_id = msg.chain_id();
            match msg {
                Message::Action(_) | Message::Block(_) | Message::Consensus(_) => {
                    dispatcher.handle_broadcast(chain_id, msg)
                }
                Message::BlockSyncRequest(_) | Message::BlockSyncResponse(_) => {
                    dispatcher.handle_tell(chain_id, origin, msg)
                }
            }
        } else {
            thread::yield_now()
        }
    })
}
