//! Capability contracts of the external collaborators.
//!
//! The state machine sees its collaborators only through these traits;
//! tests inject in-memory implementations. Every implementation must be
//! internally thread-safe: the FSM worker shares them with the network
//! ingress paths.

use crate::{ChainError, PoolError, TransportError, ValidationError};
use rolldpos_messages::ConsensusMsg;
use rolldpos_types::{Action, Address, Block, Hash, KeyPair};
use std::time::Duration;

/// A consensus candidate from the state factory's candidate table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Candidate account.
    pub address: Address,
    /// Accumulated vote weight.
    pub votes: u128,
}

/// Committed account state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountState {
    /// Highest committed nonce.
    pub nonce: u64,
    /// Spendable balance.
    pub balance: u128,
}

/// The blockchain handle.
pub trait Chain: Send + Sync {
    /// Height of the committed tip.
    fn tip_height(&self) -> u64;

    /// Hash of the committed tip; zero before genesis.
    fn tip_hash(&self) -> Hash;

    /// Candidate table as of `height`, ordered by vote weight.
    fn candidates_by_height(&self, height: u64) -> Result<Vec<Candidate>, ChainError>;

    /// Fetch a committed block.
    fn block_by_height(&self, height: u64) -> Option<Block>;

    /// Assemble and sign a block on the current tip, prepending the
    /// coinbase transfer for `producer`.
    fn mint_new_block(
        &self,
        transfers: Vec<Action>,
        votes: Vec<Action>,
        executions: Vec<Action>,
        producer: &KeyPair,
    ) -> Result<Block, ChainError>;

    /// Assemble the placeholder block committed on vote timeout: correct
    /// height and parent, no actions, no producer.
    fn mint_new_dummy_block(&self) -> Block;

    /// Assemble and sign a block carrying the DKG fields: the share
    /// signature signs `seed` with `dkg_key`.
    #[allow(clippy::too_many_arguments)]
    fn mint_new_dkg_block(
        &self,
        transfers: Vec<Action>,
        votes: Vec<Action>,
        executions: Vec<Action>,
        producer: &KeyPair,
        dkg_id: Vec<u8>,
        dkg_key: &KeyPair,
        seed: &[u8],
    ) -> Result<Block, ChainError>;

    /// Run the block validator against the current tip.
    fn validate_block(&self, block: &Block) -> Result<(), ValidationError>;

    /// Append a block to the chain.
    fn commit_block(&self, block: &Block) -> Result<(), ChainError>;

    /// Committed state of an account; default state for unknown accounts.
    fn state_by_addr(&self, addr: &Address) -> AccountState;
}

/// The pending-action pool handle.
pub trait ActPool: Send + Sync {
    /// Snapshot of pending actions whose cumulative gas fits block limits,
    /// as `(transfers, votes, executions)`.
    fn pick_actions(&self) -> (Vec<Action>, Vec<Action>, Vec<Action>);

    /// Drop actions made stale by a commit or discard.
    fn reset(&self);

    /// Add a pending transfer.
    fn add_transfer(&self, action: Action) -> Result<(), PoolError>;

    /// Add a pending vote.
    fn add_vote(&self, action: Action) -> Result<(), PoolError>;

    /// Add a pending execution.
    fn add_execution(&self, action: Action) -> Result<(), PoolError>;
}

/// The peer-to-peer overlay handle.
pub trait Overlay: Send + Sync {
    /// Gossip a message to all peers.
    fn broadcast(&self, msg: ConsensusMsg) -> Result<(), TransportError>;

    /// Send a message to one peer.
    fn tell(&self, peer: &Address, msg: ConsensusMsg) -> Result<(), TransportError>;

    /// Currently connected peers.
    fn peers(&self) -> Vec<Address>;

    /// This node's overlay address.
    fn self_addr(&self) -> Address;
}

/// Monotonic time source, abstracted so tests can inject a mock clock.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary epoch.
    fn now(&self) -> Duration;

    /// Wall-clock seconds since the UNIX epoch, for block timestamps.
    fn unix_secs(&self) -> u64;
}

/// The production clock.
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    /// Create a clock anchored at construction time.
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn unix_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
