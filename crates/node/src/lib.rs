//! Node-side plumbing around the consensus state machine.
//!
//! This crate hosts everything that sits between the wire and the state
//! machine on a running node:
//!
//! - [`ConsensusRunner`]: the single worker pulling the FSM event queue
//! - [`event_from_message`]: overlay ingress, signature-checked
//! - [`RpcRateLimiter`]: per-client sliding-window limiting at RPC ingress
//! - Prometheus counters for events handled and requests dropped

mod counter;
mod ingress;
mod metrics;
mod rate_limiter;
mod runner;
mod telemetry;

pub use counter::SlidingWindowCounter;
pub use ingress::event_from_message;
pub use metrics::{CONSENSUS_EVENTS, RPC_REQUESTS_DROPPED};
pub use rate_limiter::{RateLimitConfig, RateLimitError, RpcRateLimiter};
pub use runner::{ConsensusRunner, StopHandle};
pub use telemetry::init_tracing;
