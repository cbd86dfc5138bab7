//! Core types for Roll-DPoS consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, addresses, cryptographic keys and signatures
//! - **Actions**: the three payload classes (transfer, vote, execution)
//! - **Blocks**: header, body, Merkle root, producer signature
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod address;
mod crypto;
mod hash;

mod action;
mod block;
mod merkle;

pub use action::{Action, ActionError, ActionPayload, MAX_TRANSFER_PAYLOAD_BYTES};
pub use address::{Address, AddressError, ADDRESS_HRP};
pub use block::{Block, BlockError, BlockHeader, PROTOCOL_VERSION};
pub use crypto::{AggregateError, KeyPair, KeyType, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use merkle::merkle_root;

/// Test utilities shared by the workspace test suites.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Create a deterministic Ed25519 keypair from a seed byte.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed(KeyType::Ed25519, &[seed; 32])
    }

    /// Create a deterministic address from a seed byte.
    pub fn test_address(seed: u8) -> Address {
        Address::from_pubkey(&test_keypair(seed).public_key())
    }

    /// Create a signed transfer from `sender_key` at the given nonce.
    pub fn test_transfer(sender_key: &KeyPair, nonce: u64, amount: u128) -> Action {
        let sender = Address::from_pubkey(&sender_key.public_key());
        let recipient = test_address(0xee);
        Action::new_transfer(nonce, amount, sender, recipient, vec![], 100_000, 10)
            .expect("valid transfer")
            .sign(sender_key)
            .expect("signable")
    }

    /// Create a signed vote from `voter_key` at the given nonce.
    pub fn test_vote(voter_key: &KeyPair, nonce: u64, votee: Address) -> Action {
        let voter = Address::from_pubkey(&voter_key.public_key());
        Action::new_vote(nonce, voter, votee, 100_000, 10)
            .expect("valid vote")
            .sign(voter_key)
            .expect("signable")
    }
}
