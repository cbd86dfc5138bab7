//! Pending-action pool.
//!
//! The pool uniquely owns pending actions until they are picked into a
//! block, at which point ownership transfers to the block and thence to the
//! chain. `pick_actions` returns a consistent snapshot whose cumulative gas
//! stays under the block limit; `reset` drops stale actions after a commit
//! or discard.

mod pool;

pub use pool::{InMemActPool, PoolConfig};
