//! Process-wide Prometheus counters.
//!
//! Registered once at first use; read-only thereafter.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

/// Consensus events handled, by event type.
pub static CONSENSUS_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "rolldpos_consensus_events_total",
        "Consensus events handled by the worker.",
        &["event"]
    )
    .expect("metric registration is infallible at startup")
});

/// RPC requests dropped by the rate limiter.
pub static RPC_REQUESTS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "rolldpos_rpc_requests_dropped_total",
        "RPC requests dropped by the per-client rate limiter."
    )
    .expect("metric registration is infallible at startup")
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_register_and_count() {
        // Other tests in this process share the registry, so only assert
        // monotonicity.
        let before = RPC_REQUESTS_DROPPED.get();
        RPC_REQUESTS_DROPPED.inc();
        assert!(RPC_REQUESTS_DROPPED.get() >= before + 1);

        CONSENSUS_EVENTS.with_label_values(&["StartRound"]).inc();
        assert!(CONSENSUS_EVENTS.with_label_values(&["StartRound"]).get() >= 1);
    }
}
