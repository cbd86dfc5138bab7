//! Roll-DPoS consensus state machine.
//!
//! This crate implements the consensus core as an event-driven state
//! machine: delegate-set rotation per epoch, DKG-seeded round scheduling,
//! proposer election, two-phase voting (prevote then vote), commit, epoch
//! completion, timeouts, and the dummy-block fallback when no candidate
//! gathers quorum.
//!
//! # Architecture
//!
//! The state machine processes one event at a time:
//!
//! - `RollDelegates` → rotate the delegate set, reseed, start the epoch
//! - `GenerateDkg` → run the DKG exchange, schedule the first round
//! - `StartRound` → elect the proposer, arm the propose timeout
//! - `InitBlock` → mint and broadcast a candidate (proposer only)
//! - `ProposeBlock` → validate the candidate, prevote yes/no
//! - `Prevote` → tally; a `2f+1` yes-quorum unlocks the vote phase
//! - `Vote` → tally; a `2f+1` yes-quorum commits the block
//! - `FinishEpoch` → next round, or roll delegates at the epoch boundary
//!
//! All I/O flows through the collaborator handles on [`RollDposCtx`]; the
//! single-worker discipline makes handler state access serializable.
//!
//! # Terminology
//!
//! - **Epoch**: a block range with a fixed delegate set, subdivided into
//!   sub-epochs that each cycle once through the delegate order.
//! - **Round**: one proposer slot; commits at most one block.
//! - **Quorum**: strictly more than `2f` delegates, `f = (n - 1) / 3`.

mod context;
mod fsm;
pub mod mocks;

pub use context::{
    sort_candidates, verify_dkg_signature, EpochCtx, RollDposCtx, RoundCtx,
};
pub use fsm::{ConsensusFsm, FsmError};
