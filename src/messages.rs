/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the structured messages that peers exchange, and for the envelope that carries
//! them over the wire.
//!
//! ## The envelope
//!
//! Every inbound unit of peer traffic is a [`Message`]: a tagged envelope carrying one of the five
//! payload kinds. The [dispatcher](crate::dispatcher) classifies envelopes by their
//! [type code](Message::type_code) and either invokes the subscriber synchronously (consensus
//! messages) or enqueues an event.
//!
//! ## Type code stability
//!
//! Type codes — and therefore the order of the `Message` variants, which determines the Borsh
//! enum discriminant — are part of the wire format and MUST remain stable across versions. Append
//! new kinds at the end; never reorder or remove existing ones.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{BlockHeight, ChainID, CryptoHash, Round};

/// Type code of [`Message::Action`].
pub const MSG_ACTION_TYPE: u32 = 1;
/// Type code of [`Message::Consensus`].
pub const MSG_CONSENSUS_TYPE: u32 = 2;
/// Type code of [`Message::Block`].
pub const MSG_BLOCK_TYPE: u32 = 3;
/// Type code of [`Message::BlockSyncRequest`].
pub const MSG_BLOCK_SYNC_REQUEST_TYPE: u32 = 4;
/// Type code of [`Message::BlockSyncResponse`].
pub const MSG_BLOCK_SYNC_RESPONSE_TYPE: u32 = 5;

/// The envelope carrying one unit of peer traffic.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum Message {
    Action(Action),
    Block(Block),
    BlockSyncRequest(BlockSyncRequest),
    BlockSyncResponse(BlockSyncResponse),
    Consensus(ConsensusMessage),
}

impl Message {
    /// Get the stable integer type code of this envelope.
    pub fn type_code(&self) -> u32 {
        match self {
            Message::Action(_) => MSG_ACTION_TYPE,
            Message::Block(_) => MSG_BLOCK_TYPE,
            Message::BlockSyncRequest(_) => MSG_BLOCK_SYNC_REQUEST_TYPE,
            Message::BlockSyncResponse(_) => MSG_BLOCK_SYNC_RESPONSE_TYPE,
            Message::Consensus(_) => MSG_CONSENSUS_TYPE,
        }
    }

    /// Get the `ChainID` of the chain that this envelope is about.
    pub fn chain_id(&self) -> ChainID {
        match self {
            Message::Action(action) => action.chain_id,
            Message::Block(block) => block.chain_id,
            Message::BlockSyncRequest(request) => request.chain_id,
            Message::BlockSyncResponse(response) => response.block.chain_id,
            Message::Consensus(consensus) => consensus.chain_id,
        }
    }
}

impl From<Action> for Message {
    fn from(action: Action) -> Self {
        Message::Action(action)
    }
}

impl From<Block> for Message {
    fn from(block: Block) -> Self {
        Message::Block(block)
    }
}

impl From<BlockSyncRequest> for Message {
    fn from(request: BlockSyncRequest) -> Self {
        Message::BlockSyncRequest(request)
    }
}

impl From<BlockSyncResponse> for Message {
    fn from(response: BlockSyncResponse) -> Self {
        Message::BlockSyncResponse(response)
    }
}

impl From<ConsensusMessage> for Message {
    fn from(consensus: ConsensusMessage) -> Self {
        Message::Consensus(consensus)
    }
}

/// A transaction submitted for inclusion in a block. The payload is opaque to the core: action
/// semantics belong to the subscriber's execution layer.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Action {
    pub chain_id: ChainID,
    pub payload: Vec<u8>,
}

/// A block, identified by its height and hash. The block body is opaque to the core: the
/// dispatcher and the block buffer never look inside `data`.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub chain_id: ChainID,
    pub height: BlockHeight,
    pub hash: CryptoHash,
    pub data: Vec<u8>,
}

/// Sync request unicast by the [sync worker](crate::block_sync::SyncWorker) of a lagging node to
/// one of its neighbors, asking for the blocks in the inclusive height range `[start, end]`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct BlockSyncRequest {
    pub chain_id: ChainID,
    pub start: BlockHeight,
    pub end: BlockHeight,
}

/// Container for a single block sent back in response to a [`BlockSyncRequest`]. A server
/// answering a request for the range `[start, end]` sends one response per block in the range.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct BlockSyncResponse {
    pub block: Block,
}

/// A consensus protocol message. The payload is opaque to the core and is forwarded to the
/// subscriber's consensus handler synchronously, bypassing the event queue.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ConsensusMessage {
    pub chain_id: ChainID,
    pub height: BlockHeight,
    pub round: Round,
    pub payload: Vec<u8>,
}
