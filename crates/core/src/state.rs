//! States of the consensus round/epoch lifecycle.

use std::fmt;

/// The states of the consensus state machine.
///
/// Epoch and round contexts are created on entry to `EpochStart` and
/// `RoundStart` respectively, and replaced on the next entry to the same
/// state. `Invalid` is a terminal sink for a single event: the handler that
/// produced it restarts the epoch by re-enqueueing the roll-delegates event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsensusState {
    /// Waiting to roll the delegate set for the next epoch.
    EpochStart,
    /// Running the DKG exchange for the new epoch.
    DkgGeneration,
    /// Between rounds; next round is scheduled.
    RoundStart,
    /// This node is the proposer and is minting a block.
    InitPropose,
    /// Waiting for a proposal from the expected proposer.
    AcceptPropose,
    /// Collecting prevotes.
    AcceptPrevote,
    /// Collecting votes.
    AcceptVote,
    /// Error sink for a single event.
    Invalid,
}

impl ConsensusState {
    /// All states, in lifecycle order.
    pub const ALL: [ConsensusState; 8] = [
        ConsensusState::EpochStart,
        ConsensusState::DkgGeneration,
        ConsensusState::RoundStart,
        ConsensusState::InitPropose,
        ConsensusState::AcceptPropose,
        ConsensusState::AcceptPrevote,
        ConsensusState::AcceptVote,
        ConsensusState::Invalid,
    ];
}

impl fmt::Display for ConsensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsensusState::EpochStart => "EpochStart",
            ConsensusState::DkgGeneration => "DkgGeneration",
            ConsensusState::RoundStart => "RoundStart",
            ConsensusState::InitPropose => "InitPropose",
            ConsensusState::AcceptPropose => "AcceptPropose",
            ConsensusState::AcceptPrevote => "AcceptPrevote",
            ConsensusState::AcceptVote => "AcceptVote",
            ConsensusState::Invalid => "Invalid",
        };
        write!(f, "{name}")
    }
}
