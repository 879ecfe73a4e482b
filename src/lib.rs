/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The core subsystems of a multi-chain node: everything needed to move a peer-to-peer message
//! from the wire into a deterministic, persistent state transition.
//!
//! ## What lives here
//!
//! - The [dispatcher](dispatcher): a single-consumer event loop that fans inbound peer traffic
//!   into per-chain [subscribers](dispatcher::Subscriber), preserving per-chain ordering and
//!   shedding load when the bounded queue fills up.
//! - [Block sync](block_sync): a sliding-window gap detector plus a recurring worker that
//!   recovers missing blocks from neighbors via unicast requests with round-robin peer rotation.
//! - The [state module](state): a staged, revertible write batch with a read-through cache in
//!   front of a [persistent store](state::PersistentStore) — the substrate on which action
//!   execution and consensus speculation run.
//! - [Endorsements](endorsement): the aggregation structure that turns individual consensus votes
//!   into evidence of a quorum for a proposed block.
//!
//! [`node::Node`] wires the threads together over a pluggable [network](networking::Network).
//!
//! ## What deliberately does not live here
//!
//! Transaction semantics, block validation, cryptographic agreement, and the on-disk layout of
//! the persistent store are the outer node's concern, reached through the
//! [`Subscriber`](dispatcher::Subscriber) and [`PersistentStore`](state::PersistentStore) seams.
//! The core never looks inside an action or a block body.

pub mod block_sync;

pub mod config;

pub mod dispatcher;

pub mod endorsement;

pub(crate) mod logging;

pub mod messages;

pub mod metrics;

pub mod networking;

pub mod node;

pub mod state;

pub mod types;
