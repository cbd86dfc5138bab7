//! Consensus configuration.

use serde::Deserialize;
use std::time::Duration;

/// Configuration of the Roll-DPoS state machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Capacity of the event queue. When the queue is full, producing an
    /// event errors back to the producer instead of blocking.
    pub event_chan_size: u32,

    /// Delegate-set size for an epoch.
    pub num_delegates: u32,

    /// Rounds per epoch is `num_delegates * num_sub_epochs`.
    pub num_sub_epochs: u32,

    /// Per-round time budget; also the slot width under time-based
    /// proposer rotation.
    pub proposer_interval: Duration,

    /// Rotate the expected proposer by wall-clock slot instead of by
    /// round.
    pub time_based_rotation: bool,

    /// Commit a placeholder block when a round times out in the vote
    /// phase, preserving height monotonicity.
    pub enable_dummy_block: bool,

    /// Timeout after entering `AcceptPropose`.
    pub accept_propose_ttl: Duration,

    /// Timeout after entering `AcceptPrevote`.
    pub accept_prevote_ttl: Duration,

    /// Timeout after entering `AcceptVote`.
    pub accept_vote_ttl: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            event_chan_size: 1024,
            num_delegates: 21,
            num_sub_epochs: 1,
            proposer_interval: Duration::from_secs(10),
            time_based_rotation: false,
            enable_dummy_block: true,
            accept_propose_ttl: Duration::from_secs(5),
            accept_prevote_ttl: Duration::from_secs(5),
            accept_vote_ttl: Duration::from_secs(5),
        }
    }
}

impl ConsensusConfig {
    /// Number of rounds in one epoch.
    pub fn rounds_per_epoch(&self) -> u64 {
        u64::from(self.num_delegates) * u64::from(self.num_sub_epochs)
    }
}
