//! Stable error kinds for the validation and consensus paths.
//!
//! Each kind carries a stable identifier for programmatic matching; the
//! wrapping message is human-oriented. Only the coinbase and address
//! messages are contractual as text.

use rolldpos_types::Hash;
use std::fmt;
use thiserror::Error;

/// Which address a validation failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTarget {
    /// A transfer's recipient.
    TransferRecipient,
    /// A vote's votee.
    Votee,
    /// An execution's contract.
    Contract,
}

impl fmt::Display for AddressTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressTarget::TransferRecipient => "transfer recipient",
            AddressTarget::Votee => "votee",
            AddressTarget::Contract => "contract",
        };
        write!(f, "{name}")
    }
}

/// Block validation failures, in the order the validator checks them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Height or previous-hash does not extend the current tip.
    #[error(
        "chain discontinuity: block {height} on parent {prev_hash} \
         does not extend tip {tip_height} ({tip_hash})"
    )]
    ChainDiscontinuity {
        height: u64,
        prev_hash: Hash,
        tip_height: u64,
        tip_hash: Hash,
    },

    /// Recomputed transaction root differs from the header.
    #[error("invalid merkle root: header declares {declared}, computed {computed}")]
    InvalidMerkleRoot { declared: Hash, computed: Hash },

    /// Block producer or action signature failed to verify.
    #[error("failed to verify signature: {0}")]
    InvalidSignature(String),

    /// Zero, multiple, or misplaced coinbase transfers.
    #[error("wrong number of coinbase transfers in block: {count}")]
    WrongCoinbase { count: usize },

    /// Ill-formed recipient, votee, or contract address.
    #[error("failed to validate {target}'s address: {address}")]
    InvalidAddress {
        target: AddressTarget,
        address: String,
    },

    /// A sender's block-local nonces are not exactly the committed nonce
    /// plus one through plus k.
    #[error("invalid nonce continuity for sender {sender}")]
    ActionNonce { sender: String },
}

impl ValidationError {
    /// Stable kind identifier for programmatic matching.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::ChainDiscontinuity { .. } => "ChainDiscontinuity",
            ValidationError::InvalidMerkleRoot { .. } => "InvalidMerkleRoot",
            ValidationError::InvalidSignature(_) => "InvalidSignature",
            ValidationError::WrongCoinbase { .. } => "WrongCoinbase",
            ValidationError::InvalidAddress { .. } => "InvalidAddress",
            ValidationError::ActionNonce { .. } => "ErrActionNonce",
        }
    }
}

/// Failures of the chain collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Candidate table unavailable or too small for an epoch.
    #[error("failed to fetch candidates: {0}")]
    Candidates(String),

    /// Block assembly failed.
    #[error("failed to mint block: {0}")]
    Mint(String),

    /// Commit rejected.
    #[error("failed to commit block: {0}")]
    Commit(String),

    /// Validation failure surfaced through the chain handle.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failures of the action-pool collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Pool is at capacity.
    #[error("action pool is full")]
    Full,

    /// Action already pooled.
    #[error("action {0} already exists in pool")]
    Duplicate(Hash),

    /// Action rejected at ingress.
    #[error("invalid action: {0}")]
    InvalidAction(String),
}

/// Failures of the overlay collaborator. Logged and swallowed; they never
/// block consensus progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Broadcast or tell could not be delivered.
    #[error("failed to send message: {0}")]
    SendFailed(String),
}
