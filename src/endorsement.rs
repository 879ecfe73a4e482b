/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Consensus votes and their aggregation into an endorsement set.
//!
//! An [`Endorsement`] is a single endorser's digitally signed, non-repudiable
//! [vote](ConsensusVote) about one block: a proposal vote, a lock vote, or a commit vote. An
//! [`EndorsementSet`] accumulates the endorsements for one block hash across rounds, retaining
//! for each `(endorser, topic)` pair only the endorsement from the highest round observed, and
//! answers the quorum question the consensus driver asks: how many of these endorsers have a
//! valid endorsement on these topics?
//!
//! The set lives for one proposal-plus-commit cycle and is deliberately not synchronized: the
//! consensus loop owns it and is single-threaded.
//!
//! ## Serialization
//!
//! `EndorsementSet` and `Endorsement` round-trip through the [`EndorsementSetBytes`] and
//! [`EndorsementBytes`] intermediate representations, which replace the `VerifyingKey` with its
//! raw bytes so that the Borsh traits can be derived. Converting back is fallible, since raw
//! bytes are not guaranteed to be a valid Ed25519 public key.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    BlockHeight, CryptoHash, Keypair, Round, Signature, SignatureBytes, Verifier, VerifyingKey,
};

/// Data types that contain: 1. A message, and 2. A digital signature over said message whose
/// correctness can be verified against a `VerifyingKey`.
pub(crate) trait SignedMessage: Clone {
    /// Get the bytes that are passed as input into the signing function to form the signature of
    /// the `SignedMessage`.
    fn message_bytes(&self) -> Vec<u8>;

    /// Get the signature of the `SignedMessage`.
    fn signature_bytes(&self) -> SignatureBytes;

    /// Verify that `signature_bytes` is a signature created by `verifying_key` over
    /// `message_bytes`.
    fn is_correct(&self, verifying_key: &VerifyingKey) -> bool {
        let signature = Signature::from_bytes(&self.signature_bytes().bytes());
        verifying_key
            .verify(&self.message_bytes(), &signature)
            .is_ok()
    }
}

/// The three decisions an endorser can vote on during the consensus cycle of one block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, BorshSerialize, BorshDeserialize)]
pub enum ConsensusVoteTopic {
    Proposal,
    Lock,
    Commit,
}

/// The content of a consensus vote: which block, at which height and round, on which topic, and
/// whether the endorser approves.
#[derive(Clone, Copy, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ConsensusVote {
    pub block_hash: CryptoHash,
    pub height: BlockHeight,
    pub round: Round,
    pub topic: ConsensusVoteTopic,
    pub decision: bool,
}

/// A [`ConsensusVote`] signed by its endorser.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Endorsement {
    vote: ConsensusVote,
    endorser: VerifyingKey,
    signature: SignatureBytes,
}

impl Endorsement {
    /// Create an `Endorsement` from its parts. The signature is not checked here; it is checked
    /// when the endorsement is [added to a set](EndorsementSet::add_endorsement).
    pub fn new(vote: ConsensusVote, endorser: VerifyingKey, signature: SignatureBytes) -> Self {
        Self {
            vote,
            endorser,
            signature,
        }
    }

    /// Create an `Endorsement` by signing `vote` with `keypair`.
    pub fn sign(vote: ConsensusVote, keypair: &Keypair) -> Endorsement {
        let signature = keypair.sign(&vote.try_to_vec().unwrap());
        Self {
            vote,
            endorser: keypair.public(),
            signature,
        }
    }

    /// Get the vote that this endorsement signs.
    pub fn vote(&self) -> &ConsensusVote {
        &self.vote
    }

    /// Get the public key of the endorser.
    pub fn endorser(&self) -> &VerifyingKey {
        &self.endorser
    }

    /// Get the signature over the vote.
    pub fn signature(&self) -> SignatureBytes {
        self.signature
    }

    /// Verify that the signature is a correct signature by the endorser over the vote.
    pub fn verify_signature(&self) -> bool {
        self.is_correct(&self.endorser)
    }
}

impl SignedMessage for Endorsement {
    fn message_bytes(&self) -> Vec<u8> {
        self.vote.try_to_vec().unwrap()
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// Collection of the endorsements for one block hash, holding at most one endorsement per
/// `(endorser, topic)` pair: always the one from the highest round observed so far.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EndorsementSet {
    block_hash: CryptoHash,
    locked_round: Round,
    endorsements: Vec<Endorsement>,
}

impl EndorsementSet {
    /// Create an empty endorsement set for the block identified by `block_hash`.
    pub fn new(block_hash: CryptoHash) -> EndorsementSet {
        Self {
            block_hash,
            locked_round: Round::init(),
            endorsements: Vec::new(),
        }
    }

    /// Get the hash of the endorsed block.
    pub fn block_hash(&self) -> CryptoHash {
        self.block_hash
    }

    /// Get the locked round number.
    pub fn round(&self) -> Round {
        self.locked_round
    }

    /// Record `round` as the currently locked round.
    ///
    /// Monotonicity is not enforced here: the consensus driver owns the locked round and is
    /// responsible for only ever moving it forward.
    pub fn set_round(&mut self, round: Round) {
        self.locked_round = round
    }

    /// Get the retained endorsements, in insertion order of their `(endorser, topic)` pairs.
    pub fn endorsements(&self) -> &[Endorsement] {
        &self.endorsements
    }

    /// Add an endorsement with the right block hash and signature.
    ///
    /// Fails with:
    /// - [`EndorsementError::InvalidHash`] if the endorsement is for a different block;
    /// - [`EndorsementError::InvalidSignature`] if signature verification fails;
    /// - [`EndorsementError::ExpiredEndorsement`] if an endorsement for the same
    ///   `(endorser, topic)` pair from the same or a later round is already retained. An
    ///   endorsement from a strictly higher round replaces the retained one.
    pub fn add_endorsement(&mut self, endorsement: Endorsement) -> Result<(), EndorsementError> {
        if endorsement.vote().block_hash != self.block_hash {
            return Err(EndorsementError::InvalidHash);
        }
        if !endorsement.verify_signature() {
            return Err(EndorsementError::InvalidSignature);
        }
        for existing in self.endorsements.iter_mut() {
            if existing.endorser() != endorsement.endorser() {
                continue;
            }
            if existing.vote().topic != endorsement.vote().topic {
                continue;
            }
            if existing.vote().round < endorsement.vote().round {
                *existing = endorsement;
                return Ok(());
            }
            return Err(EndorsementError::ExpiredEndorsement);
        }
        self.endorsements.push(endorsement);
        Ok(())
    }

    /// Count the retained endorsements whose topic is one of `topics` and whose endorser is one
    /// of `endorsers`, with each endorser contributing at most one to the count.
    pub fn count_valid(
        &self,
        topics: &[ConsensusVoteTopic],
        endorsers: &[VerifyingKey],
    ) -> usize {
        let mut remaining: HashSet<VerifyingKey> = endorsers.iter().copied().collect();
        let mut count = 0;
        for endorsement in &self.endorsements {
            if !topics.contains(&endorsement.vote().topic) {
                continue;
            }
            if !remaining.remove(endorsement.endorser()) {
                continue;
            }
            count += 1;
        }
        count
    }
}

/// Intermediate representation of [`Endorsement`] for serialization and deserialization.
///
/// This type exists because `Endorsement` internally contains [`ed25519_dalek::VerifyingKey`],
/// which does not implement the Borsh traits. `EndorsementBytes` replaces the key with its raw
/// bytes, so conversion from this type back into `Endorsement` using `TryFrom` is fallible.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct EndorsementBytes {
    vote: ConsensusVote,
    endorser: [u8; 32],
    signature: SignatureBytes,
}

impl TryFrom<EndorsementBytes> for Endorsement {
    type Error = ed25519_dalek::SignatureError;

    fn try_from(value: EndorsementBytes) -> Result<Self, Self::Error> {
        Ok(Endorsement {
            vote: value.vote,
            endorser: VerifyingKey::from_bytes(&value.endorser)?,
            signature: value.signature,
        })
    }
}

impl Into<EndorsementBytes> for &Endorsement {
    fn into(self) -> EndorsementBytes {
        EndorsementBytes {
            vote: self.vote,
            endorser: self.endorser.to_bytes(),
            signature: self.signature,
        }
    }
}

/// Intermediate representation of [`EndorsementSet`] for serialization and deserialization.
///
/// See the [rationale](EndorsementBytes) for `EndorsementBytes`.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct EndorsementSetBytes {
    block_hash: CryptoHash,
    locked_round: Round,
    endorsements: Vec<EndorsementBytes>,
}

impl TryFrom<EndorsementSetBytes> for EndorsementSet {
    type Error = ed25519_dalek::SignatureError;

    fn try_from(value: EndorsementSetBytes) -> Result<Self, Self::Error> {
        let endorsements = value
            .endorsements
            .into_iter()
            .map(Endorsement::try_from)
            .collect::<Result<Vec<Endorsement>, Self::Error>>()?;
        Ok(EndorsementSet {
            block_hash: value.block_hash,
            locked_round: value.locked_round,
            endorsements,
        })
    }
}

impl Into<EndorsementSetBytes> for &EndorsementSet {
    fn into(self) -> EndorsementSetBytes {
        EndorsementSetBytes {
            block_hash: self.block_hash,
            locked_round: self.locked_round,
            endorsements: self.endorsements.iter().map(|en| en.into()).collect(),
        }
    }
}

/// Error when adding an endorsement to an [`EndorsementSet`].
#[derive(Debug, PartialEq, Eq)]
pub enum EndorsementError {
    /// The endorsement's block hash is different from the set's.
    InvalidHash,

    /// The endorsement's signature is invalid.
    InvalidSignature,

    /// The endorsement is from the same or an earlier round than the retained one.
    ExpiredEndorsement,
}

impl Display for EndorsementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EndorsementError::InvalidHash => {
                write!(f, "the endorsement hash is different from the set")
            }
            EndorsementError::InvalidSignature => {
                write!(f, "the endorsement's signature is invalid")
            }
            EndorsementError::ExpiredEndorsement => {
                write!(f, "the endorsement is from a previous round")
            }
        }
    }
}

impl std::error::Error for EndorsementError {}
