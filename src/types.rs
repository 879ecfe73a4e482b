/*
    Copyright © 2024, Polychain Labs
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, Sub},
};

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

pub use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Number that uniquely identifies one blockchain among the several that a single node may host.
///
/// Every inbound message carries a `ChainID`, and the dispatcher routes the message to the
/// subscriber registered for that `ChainID`. All peers replicating the same chain should be
/// configured to use the same `ChainID`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, BorshDeserialize, BorshSerialize)]
pub struct ChainID(u32);

impl ChainID {
    /// Create a new `ChainID` with an `int` value.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the `u32` value of this `ChainID`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for ChainID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Height of a block in a chain. Starts at 0 for the genesis block and increases by 1 for every
/// block that extends the chain.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    /// Create a new `BlockHeight` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BlockHeight`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for BlockHeight {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;
    fn add(self, rhs: u64) -> Self::Output {
        BlockHeight::new(self.0.add(rhs))
    }
}

impl Sub<BlockHeight> for BlockHeight {
    type Output = u64;
    fn sub(self, rhs: BlockHeight) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Round number of a consensus instance at one block height. Starts at 0 and increases by 1 every
/// time a round fails to gather a quorum in time.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Round(u32);

impl Round {
    /// Create a new `Round` wrapping `int`.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the initial `Round`, which is 0.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the inner `u32` of this `Round`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// 32-byte cryptographic hash, used to identify blocks.
///
/// The type signature allows instances of `CryptoHash` to be produced by any cryptographic hash
/// function with a 32-byte output. Within polychain-core, block hashes are SHA256 hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 20-byte digest identifying a `(namespace, key)` pair inside the
/// [cached batch](crate::state::CachedBatch)'s read-through cache.
///
/// The digest is computed as `H(H(namespace) || key)`, where `H` is a 160-bit hash (SHA256
/// truncated to its first 20 bytes). Hashing the namespace before concatenating it with the key
/// guarantees that namespaces never collide across the cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CacheKey([u8; 20]);

impl CacheKey {
    /// Compute the `CacheKey` for a `(namespace, key)` pair.
    pub fn digest(namespace: &str, key: &[u8]) -> CacheKey {
        let mut stream = hash160(namespace.as_bytes()).to_vec();
        stream.extend_from_slice(key);
        CacheKey(hash160(&stream))
    }

    /// Get the inner `[u8; 20]` value of this `CacheKey`.
    pub const fn bytes(&self) -> [u8; 20] {
        self.0
    }
}

// First 20 bytes of the SHA256 digest of `preimage`.
fn hash160(preimage: &[u8]) -> [u8; 20] {
    let digest = Sha256::digest(preimage);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[..20]);
    bytes
}

/// Ed25519 digital signature.
///
/// Within polychain-core, these are produced using the [`ed25519_dalek`] crate, whose main
/// definitions are re-exported from this module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A wrapper around [`SigningKey`] that implements a [convenience method](Self::sign) for creating
/// signatures as well as a [getter](Self::public) for the public key.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Convenience method for creating signatures over values or messages represented as slices
    /// of bytes.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}
