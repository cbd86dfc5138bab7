//! Block validation kernel and the in-memory chain.
//!
//! The validator is the stateless-given-a-state-factory predicate the
//! consensus state machine runs on every candidate block: "is this block
//! acceptable as child of the current tip?". The in-memory chain implements
//! the [`rolldpos_core::Chain`] contract for tests and single-process
//! deployments; persistent storage engines sit behind the same trait.

mod chain;
mod state;
mod validation;

pub use chain::{InMemChain, BLOCK_REWARD};
pub use state::{InMemStateFactory, StateFactory};
pub use validation::{validate, verify_actions};
