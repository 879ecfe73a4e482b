/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for the endorsement set: higher-round replacement, rejection of expired and mismatched
//! endorsements, quorum counting with endorser deduplication, and the serialization round trip.

mod common;

use borsh::{BorshDeserialize, BorshSerialize};

use polychain_core::endorsement::{
    ConsensusVote, ConsensusVoteTopic, Endorsement, EndorsementError, EndorsementSet,
    EndorsementSetBytes,
};
use polychain_core::types::{BlockHeight, CryptoHash, Keypair, Round, SignatureBytes};

use common::keypairs;

const BLOCK_HASH: CryptoHash = CryptoHash::new([0xAA; 32]);

fn vote(topic: ConsensusVoteTopic, round: u32) -> ConsensusVote {
    ConsensusVote {
        block_hash: BLOCK_HASH,
        height: BlockHeight::new(42),
        round: Round::new(round),
        topic,
        decision: true,
    }
}

#[test]
fn higher_round_replaces_and_equal_or_lower_round_expires() {
    let keypair = Keypair::new(keypairs(1).remove(0));
    let mut set = EndorsementSet::new(BLOCK_HASH);

    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 1), &keypair))
        .unwrap();
    assert_eq!(set.endorsements().len(), 1);

    // Round 2 replaces round 1 for the same (endorser, topic) pair.
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 2), &keypair))
        .unwrap();
    assert_eq!(set.endorsements().len(), 1);
    assert_eq!(set.endorsements()[0].vote().round, Round::new(2));

    // Round 1 is now expired, and the retained endorsement is untouched.
    assert_eq!(
        set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 1), &keypair)),
        Err(EndorsementError::ExpiredEndorsement)
    );
    assert_eq!(set.endorsements()[0].vote().round, Round::new(2));

    // So is a duplicate of the retained round.
    assert_eq!(
        set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 2), &keypair)),
        Err(EndorsementError::ExpiredEndorsement)
    );
    assert_eq!(set.endorsements().len(), 1);
}

#[test]
fn retained_round_is_the_maximum_of_all_added_rounds() {
    let keypair = Keypair::new(keypairs(1).remove(0));
    let mut set = EndorsementSet::new(BLOCK_HASH);

    for round in [1, 3, 2, 3, 0] {
        let _ = set.add_endorsement(Endorsement::sign(
            vote(ConsensusVoteTopic::Proposal, round),
            &keypair,
        ));
    }
    assert_eq!(set.endorsements().len(), 1);
    assert_eq!(set.endorsements()[0].vote().round, Round::new(3));
}

#[test]
fn same_endorser_may_endorse_each_topic_once() {
    let keypair = Keypair::new(keypairs(1).remove(0));
    let mut set = EndorsementSet::new(BLOCK_HASH);

    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Proposal, 1), &keypair))
        .unwrap();
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 1), &keypair))
        .unwrap();
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Commit, 1), &keypair))
        .unwrap();
    assert_eq!(set.endorsements().len(), 3);
}

#[test]
fn wrong_block_hash_is_rejected() {
    let keypair = Keypair::new(keypairs(1).remove(0));
    let mut set = EndorsementSet::new(BLOCK_HASH);

    let foreign_vote = ConsensusVote {
        block_hash: CryptoHash::new([0xBB; 32]),
        ..vote(ConsensusVoteTopic::Lock, 1)
    };
    assert_eq!(
        set.add_endorsement(Endorsement::sign(foreign_vote, &keypair)),
        Err(EndorsementError::InvalidHash)
    );
    assert!(set.endorsements().is_empty());
}

#[test]
fn tampered_signature_is_rejected() {
    let keypair = Keypair::new(keypairs(1).remove(0));
    let mut set = EndorsementSet::new(BLOCK_HASH);

    let endorsement = Endorsement::new(
        vote(ConsensusVoteTopic::Commit, 1),
        keypair.public(),
        SignatureBytes::new([7; 64]),
    );
    assert_eq!(
        set.add_endorsement(endorsement),
        Err(EndorsementError::InvalidSignature)
    );
    assert!(set.endorsements().is_empty());

    // A vote signed by one keypair but attributed to another fails too.
    let other = Keypair::new(keypairs(1).remove(0));
    let forged = Endorsement::new(
        vote(ConsensusVoteTopic::Commit, 1),
        other.public(),
        keypair.sign(&vote(ConsensusVoteTopic::Commit, 1).try_to_vec().unwrap()),
    );
    assert_eq!(
        set.add_endorsement(forged),
        Err(EndorsementError::InvalidSignature)
    );
}

#[test]
fn count_valid_deduplicates_endorsers() {
    let signers: Vec<Keypair> = keypairs(3).into_iter().map(Keypair::new).collect();
    let (a, b, c) = (&signers[0], &signers[1], &signers[2]);
    let mut set = EndorsementSet::new(BLOCK_HASH);

    // A endorses both the proposal and the lock; B endorses the lock; C endorses the commit.
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Proposal, 1), a))
        .unwrap();
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 1), a))
        .unwrap();
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 1), b))
        .unwrap();
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Commit, 1), c))
        .unwrap();

    let proposal_or_lock = [ConsensusVoteTopic::Proposal, ConsensusVoteTopic::Lock];

    // A's two matching endorsements count once.
    assert_eq!(
        set.count_valid(&proposal_or_lock, &[a.public(), b.public()]),
        2
    );
    // C is not in the endorser list.
    assert_eq!(
        set.count_valid(&[ConsensusVoteTopic::Commit], &[a.public(), b.public()]),
        0
    );
    // All three count when every topic and endorser is admitted.
    assert_eq!(
        set.count_valid(
            &[
                ConsensusVoteTopic::Proposal,
                ConsensusVoteTopic::Lock,
                ConsensusVoteTopic::Commit,
            ],
            &[a.public(), b.public(), c.public()],
        ),
        3
    );
}

#[test]
fn locked_round_is_not_forced_monotone() {
    let mut set = EndorsementSet::new(BLOCK_HASH);
    assert_eq!(set.round(), Round::init());

    // The consensus driver owns the locked round; the set records whatever it is told.
    set.set_round(Round::new(5));
    set.set_round(Round::new(3));
    assert_eq!(set.round(), Round::new(3));
}

#[test]
fn endorsement_set_round_trips_through_bytes() {
    let signers: Vec<Keypair> = keypairs(2).into_iter().map(Keypair::new).collect();
    let mut set = EndorsementSet::new(BLOCK_HASH);
    set.set_round(Round::new(4));
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Lock, 4), &signers[0]))
        .unwrap();
    set.add_endorsement(Endorsement::sign(vote(ConsensusVoteTopic::Commit, 4), &signers[1]))
        .unwrap();

    let bytes: EndorsementSetBytes = (&set).into();
    let serialized = bytes.try_to_vec().unwrap();
    let deserialized = EndorsementSetBytes::deserialize(&mut serialized.as_slice()).unwrap();
    let round_tripped = EndorsementSet::try_from(deserialized).unwrap();

    assert_eq!(round_tripped, set);
    assert!(round_tripped
        .endorsements()
        .iter()
        .all(Endorsement::verify_signature));
}
