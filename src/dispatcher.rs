/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Routing of inbound peer traffic into per-chain subscribers.
//!
//! ## The single consumer
//!
//! The dispatcher serializes inbound events so that each [`Subscriber`] sees a single-threaded,
//! ordered stream and never needs to be reentrant. Producers (the network poller, or any thread
//! calling [`handle_broadcast`](Dispatcher::handle_broadcast) /
//! [`handle_tell`](Dispatcher::handle_tell)) enqueue events onto one bounded queue; a single
//! consumer thread drains it and invokes the subscriber registered for the event's chain.
//!
//! Per chain, events are consumed in the order they were enqueued. There is no ordering guarantee
//! across chains: the single consumer makes intra-chain order total, at the cost that a slow
//! subscriber on one chain delays the others.
//!
//! ## Load shedding
//!
//! Enqueueing never blocks a producer. When the queue is at capacity
//! ([`event_chan_size`](crate::config::DispatcherConfiguration::event_chan_size)), the event is
//! dropped with a warning. The [audit tally](Dispatcher::event_audit) is incremented on
//! consumption, not enqueue, so it reflects events that reached the consumer rather than events
//! that were offered.
//!
//! ## The synchronous consensus path
//!
//! Consensus messages bypass the queue: [`handle_broadcast`](Dispatcher::handle_broadcast)
//! invokes the subscriber's consensus handler on the calling thread, preserving the latency that
//! the consensus protocol's round timing depends on.
//!
//! ## Failure semantics
//!
//! Errors returned by subscriber handlers are logged — at `debug` level for actions, `error`
//! level for blocks and sync requests — and the event is considered processed. The transport's
//! delivery semantics are at-least-once: the dispatcher does not deduplicate, so a message
//! delivered twice reaches the subscriber twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use crate::config::DispatcherConfiguration;
use crate::messages::{
    Action, Block, BlockSyncRequest, ConsensusMessage, Message, MSG_ACTION_TYPE,
    MSG_BLOCK_SYNC_REQUEST_TYPE, MSG_BLOCK_SYNC_RESPONSE_TYPE, MSG_BLOCK_TYPE,
};
use crate::metrics::DISPATCH_REQUEST_COUNTER;
use crate::types::{ChainID, VerifyingKey};

/// Error returned by a [`Subscriber`] handler. Opaque to the dispatcher, which only logs it.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// The handler set that the outer node registers for one chain.
///
/// The dispatcher owns no subscriber state beyond the `ChainID → Subscriber` mapping, and the
/// subscriber must not hold the dispatcher, so the reference graph stays acyclic.
pub trait Subscriber: Send + Sync {
    /// Handle an action gossiped by a peer.
    fn handle_action(&self, action: Action) -> Result<(), SubscriberError>;

    /// Handle a newly proposed block gossiped by a peer.
    fn handle_block(&self, block: Block) -> Result<(), SubscriberError>;

    /// Handle a block received in response to a sync request.
    fn handle_block_sync(&self, block: Block) -> Result<(), SubscriberError>;

    /// Handle a sync request unicast by a lagging peer. `origin` identifies the peer so that the
    /// reply can be addressed.
    fn handle_sync_request(
        &self,
        origin: VerifyingKey,
        request: BlockSyncRequest,
    ) -> Result<(), SubscriberError>;

    /// Handle a consensus message. Called synchronously on the thread that received the message.
    fn handle_consensus_msg(&self, msg: ConsensusMessage) -> Result<(), SubscriberError>;
}

/// A unit of work on the dispatcher's queue. Every event is about exactly one chain.
enum Event {
    Action {
        chain_id: ChainID,
        action: Action,
    },
    Block {
        chain_id: ChainID,
        block: Block,
        kind: BlockKind,
    },
    SyncRequest {
        chain_id: ChainID,
        origin: VerifyingKey,
        request: BlockSyncRequest,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    /// A newly proposed block, gossiped by a peer.
    New,
    /// A block received in response to a sync request.
    Synced,
}

type SubscriberMap = HashMap<ChainID, Arc<dyn Subscriber>>;

/// The request and event dispatcher for the node. See the [module documentation](self) for the
/// concurrency model.
pub struct Dispatcher {
    event_sender: SyncSender<Event>,
    event_receiver: Mutex<Option<Receiver<Event>>>,
    subscribers: Arc<RwLock<SubscriberMap>>,
    event_audit: Arc<RwLock<HashMap<u32, u64>>>,
    started: AtomicBool,
    shutdown: AtomicBool,
    quit_sender: Mutex<Option<Sender<()>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Create a new `Dispatcher` with a queue bounded to `config.event_chan_size` events. The
    /// dispatcher does nothing until [`start`](Self::start) is called.
    pub fn new(config: &DispatcherConfiguration) -> Dispatcher {
        let (event_sender, event_receiver) = mpsc::sync_channel(config.event_chan_size);
        Self {
            event_sender,
            event_receiver: Mutex::new(Some(event_receiver)),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            event_audit: Arc::new(RwLock::new(HashMap::new())),
            started: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            quit_sender: Mutex::new(None),
            consumer: Mutex::new(None),
        }
    }

    /// Register `subscriber` as the handler set for `chain_id`. Subscribers are installed once at
    /// startup and never removed; installing a second subscriber for the same chain replaces the
    /// first.
    pub fn add_subscriber(&self, chain_id: ChainID, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.write().insert(chain_id, subscriber);
    }

    /// Start the consumer thread. Fails with [`DispatcherError::AlreadyStarted`] on the second
    /// and every subsequent call.
    pub fn start(&self) -> Result<(), DispatcherError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DispatcherError::AlreadyStarted);
        }
        let event_receiver = match self.event_receiver.lock().take() {
            Some(receiver) => receiver,
            None => return Err(DispatcherError::AlreadyStarted),
        };
        log::info!("starting dispatcher");

        let (quit_sender, quit_receiver) = mpsc::channel();
        let subscribers = Arc::clone(&self.subscribers);
        let event_audit = Arc::clone(&self.event_audit);
        let consumer = thread::spawn(move || loop {
            match quit_receiver.try_recv() {
                // A disconnect means the dispatcher itself was dropped; treat it like a quit.
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    log::info!("dispatcher consumer done");
                    return;
                }
                Err(TryRecvError::Empty) => (),
            }

            match event_receiver.try_recv() {
                Ok(event) => consume_event(&subscribers, &event_audit, event),
                Err(TryRecvError::Empty) => thread::yield_now(),
                Err(TryRecvError::Disconnected) => return,
            }
        });

        *self.quit_sender.lock() = Some(quit_sender);
        *self.consumer.lock() = Some(consumer);
        Ok(())
    }

    /// Gracefully shut the dispatcher down: signal the quit channel and wait for the consumer
    /// thread to finish. Events still on the queue are not drained. Calling `stop` again (or
    /// before `start`) logs a warning and returns.
    pub fn stop(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            log::warn!("dispatcher already in the process of shutting down");
            return;
        }
        log::info!("dispatcher is shutting down");
        if let Some(quit_sender) = self.quit_sender.lock().take() {
            let _ = quit_sender.send(());
        }
        if let Some(consumer) = self.consumer.lock().take() {
            let _ = consumer.join();
        }
    }

    /// Handle an incoming broadcast message. The transport's delivery semantics are at least
    /// once, so this handler is likely to receive duplicate messages.
    ///
    /// The message is classified by type only: consensus messages are handed to the subscriber
    /// synchronously on the calling thread, actions and blocks are enqueued unconditionally, and
    /// other message kinds do not travel by broadcast and are logged and dropped. Whether a
    /// subscriber is registered for the chain is the event loop's question; only the synchronous
    /// consensus path, which never reaches the queue, checks it here.
    pub fn handle_broadcast(&self, chain_id: ChainID, message: Message) {
        match message {
            Message::Consensus(consensus) => {
                let subscriber = match self.subscribers.read().get(&chain_id) {
                    Some(subscriber) => Arc::clone(subscriber),
                    None => {
                        log::warn!(
                            "chain {} has not been registered in the dispatcher",
                            chain_id
                        );
                        return;
                    }
                };
                if let Err(err) = subscriber.handle_consensus_msg(consensus) {
                    log::error!("failed to handle consensus message: {}", err);
                }
            }
            Message::Action(action) => self.enqueue(Event::Action { chain_id, action }),
            Message::Block(block) => self.enqueue(Event::Block {
                chain_id,
                block,
                kind: BlockKind::New,
            }),
            other => log::warn!(
                "unexpected message type {} handled by handle_broadcast",
                other.type_code()
            ),
        }
    }

    /// Handle an incoming unicast message. The `origin` is retained for the sake of replying.
    ///
    /// Sync requests and sync responses are enqueued. Other message kinds do not travel by
    /// unicast and are logged and dropped.
    pub fn handle_tell(&self, chain_id: ChainID, origin: VerifyingKey, message: Message) {
        match message {
            Message::BlockSyncRequest(request) => self.enqueue(Event::SyncRequest {
                chain_id,
                origin,
                request,
            }),
            Message::BlockSyncResponse(response) => self.enqueue(Event::Block {
                chain_id,
                block: response.block,
                kind: BlockKind::Synced,
            }),
            other => log::warn!(
                "unexpected message type {} handled by handle_tell",
                other.type_code()
            ),
        }
    }

    /// Get an independent copy of the audit tally: per message type code, the number of events of
    /// that type consumed so far.
    pub fn event_audit(&self) -> HashMap<u32, u64> {
        self.event_audit.read().clone()
    }

    fn enqueue(&self, event: Event) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        match self.event_sender.try_send(event) {
            Ok(()) => (),
            Err(TrySendError::Full(_)) => {
                log::warn!("dispatcher event queue is full, dropping an event")
            }
            Err(TrySendError::Disconnected(_)) => (),
        }
    }
}

// Process one event on the consumer thread: tally it, look up the subscriber for its chain, and
// invoke the matching handler.
fn consume_event(
    subscribers: &RwLock<SubscriberMap>,
    event_audit: &RwLock<HashMap<u32, u64>>,
    event: Event,
) {
    match event {
        Event::Action { chain_id, action } => {
            update_event_audit(event_audit, MSG_ACTION_TYPE);
            match lookup_subscriber(subscribers, chain_id) {
                Some(subscriber) => {
                    if let Err(err) = subscriber.handle_action(action) {
                        DISPATCH_REQUEST_COUNTER
                            .with_label_values(&["AddAction", "false"])
                            .inc();
                        log::debug!("handle action request error: {}", err);
                    } else {
                        DISPATCH_REQUEST_COUNTER
                            .with_label_values(&["AddAction", "true"])
                            .inc();
                    }
                }
                None => {
                    log::info!("no subscriber specified in the dispatcher, chain: {}", chain_id)
                }
            }
        }
        Event::Block {
            chain_id,
            block,
            kind,
        } => {
            let type_code = match kind {
                BlockKind::New => MSG_BLOCK_TYPE,
                BlockKind::Synced => MSG_BLOCK_SYNC_RESPONSE_TYPE,
            };
            update_event_audit(event_audit, type_code);
            match lookup_subscriber(subscribers, chain_id) {
                Some(subscriber) => match kind {
                    BlockKind::New => {
                        if let Err(err) = subscriber.handle_block(block) {
                            log::error!("failed to handle the block: {}", err);
                        }
                    }
                    BlockKind::Synced => {
                        if let Err(err) = subscriber.handle_block_sync(block) {
                            log::error!("failed to sync the block: {}", err);
                        }
                    }
                },
                None => {
                    log::info!("no subscriber specified in the dispatcher, chain: {}", chain_id)
                }
            }
        }
        Event::SyncRequest {
            chain_id,
            origin,
            request,
        } => {
            log::info!(
                "received a block sync request, start: {}, end: {}",
                request.start,
                request.end,
            );
            update_event_audit(event_audit, MSG_BLOCK_SYNC_REQUEST_TYPE);
            match lookup_subscriber(subscribers, chain_id) {
                Some(subscriber) => {
                    if let Err(err) = subscriber.handle_sync_request(origin, request) {
                        log::error!("failed to handle sync request: {}", err);
                    }
                }
                None => {
                    log::info!("no subscriber specified in the dispatcher, chain: {}", chain_id)
                }
            }
        }
    }
}

// Clone the subscriber for `chain_id` out of the map, releasing the read lock before the caller
// invokes any handler.
fn lookup_subscriber(
    subscribers: &RwLock<SubscriberMap>,
    chain_id: ChainID,
) -> Option<Arc<dyn Subscriber>> {
    subscribers.read().get(&chain_id).map(Arc::clone)
}

fn update_event_audit(event_audit: &RwLock<HashMap<u32, u64>>, type_code: u32) {
    *event_audit.write().entry(type_code).or_insert(0) += 1;
}

/// Error when operating a [`Dispatcher`].
#[derive(Debug, PartialEq, Eq)]
pub enum DispatcherError {
    /// `start` was called on a dispatcher that has already been started.
    AlreadyStarted,
}

impl std::fmt::Display for DispatcherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatcherError::AlreadyStarted => write!(f, "dispatcher already started"),
        }
    }
}

impl std::error::Error for DispatcherError {}
