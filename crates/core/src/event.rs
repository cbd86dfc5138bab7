//! Event types for the consensus state machine.

#[cfg(any(test, feature = "backdoor"))]
use crate::ConsensusState;
use rolldpos_types::{Address, Block, Hash};
use std::time::Duration;

/// All possible events the consensus state machine can receive.
///
/// Events are **passive data** - they describe something that happened.
/// External events originate at the overlay ingress; internal events are
/// produced by handlers; timeout events are produced with a delay when a
/// state is entered.
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    // ═══════════════════════════════════════════════════════════════════════
    // Epoch lifecycle (internal)
    // ═══════════════════════════════════════════════════════════════════════
    /// Roll the delegate set for the next epoch.
    RollDelegates,

    /// Run the DKG exchange for the new epoch.
    GenerateDkg,

    /// Start the next round.
    StartRound,

    /// Epoch bookkeeping after a round settles.
    FinishEpoch,

    // ═══════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════
    /// Mint and broadcast a block (this node is the proposer).
    InitBlock,

    /// A candidate block arrived from `proposer`.
    ProposeBlock { block: Box<Block>, proposer: Address },

    /// A prevote arrived from `voter`.
    Prevote {
        block_hash: Hash,
        decision: bool,
        voter: Address,
    },

    /// A vote arrived from `voter`.
    Vote {
        block_hash: Hash,
        decision: bool,
        voter: Address,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timeouts
    // ═══════════════════════════════════════════════════════════════════════
    /// No proposal arrived within the accept-propose window.
    ProposeBlockTimeout,

    /// Prevote quorum not reached within the accept-prevote window.
    PrevoteTimeout,

    /// Vote quorum not reached within the accept-vote window.
    VoteTimeout,

    // ═══════════════════════════════════════════════════════════════════════
    // Test harness
    // ═══════════════════════════════════════════════════════════════════════
    /// Unconditionally transition to the carried state.
    ///
    /// Compile-time gated; production builds must never accept this from
    /// the overlay.
    #[cfg(any(test, feature = "backdoor"))]
    Backdoor(ConsensusState),
}

impl ConsensusEvent {
    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConsensusEvent::RollDelegates => "RollDelegates",
            ConsensusEvent::GenerateDkg => "GenerateDkg",
            ConsensusEvent::StartRound => "StartRound",
            ConsensusEvent::FinishEpoch => "FinishEpoch",
            ConsensusEvent::InitBlock => "InitBlock",
            ConsensusEvent::ProposeBlock { .. } => "ProposeBlock",
            ConsensusEvent::Prevote { .. } => "Prevote",
            ConsensusEvent::Vote { .. } => "Vote",
            ConsensusEvent::ProposeBlockTimeout => "ProposeBlockTimeout",
            ConsensusEvent::PrevoteTimeout => "PrevoteTimeout",
            ConsensusEvent::VoteTimeout => "VoteTimeout",
            #[cfg(any(test, feature = "backdoor"))]
            ConsensusEvent::Backdoor(_) => "Backdoor",
        }
    }
}

/// An event stamped with its creation time on the local monotonic clock.
#[derive(Debug, Clone)]
pub struct TimedEvent {
    /// The event payload.
    pub event: ConsensusEvent,
    /// Monotonic creation time.
    pub created_at: Duration,
}
