//! Per-client rate limiting for RPC ingress.
//!
//! Each client address gets a sliding-window counter; the limit is
//! `requests_per_sec × window`. Overflow returns an error for that call
//! without touching the consensus worker, and is deliberately not logged
//! at error level.

use crate::counter::SlidingWindowCounter;
use crate::metrics::RPC_REQUESTS_DROPPED;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Rate-limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Master switch; a disabled limiter admits everything.
    pub enabled: bool,
    /// Sustained requests per second per client.
    pub rate_limit_per_sec: u64,
    /// Sliding-window width.
    pub rate_limit_window_size: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit_per_sec: 100,
            rate_limit_window_size: Duration::from_secs(60),
        }
    }
}

/// Returned to the caller when a client exceeds its budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// The client sent requests too frequently.
    #[error("client {0} sent requests too frequently")]
    Exceeded(String),
}

/// Per-client sliding-window rate limiter.
pub struct RpcRateLimiter {
    config: RateLimitConfig,
    limit: u64,
    counters: Mutex<HashMap<String, SlidingWindowCounter>>,
}

impl RpcRateLimiter {
    /// Create a limiter from `config`.
    pub fn new(config: RateLimitConfig) -> Self {
        let limit = config.rate_limit_per_sec * config.rate_limit_window_size.as_secs().max(1);
        Self {
            config,
            limit,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from `client`.
    pub fn check(&self, client: &str) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }
        let mut counters = self.counters.lock();
        let counter = counters
            .entry(client.to_string())
            .or_insert_with(|| SlidingWindowCounter::new(self.config.rate_limit_window_size));
        counter.increment();
        if counter.count() > self.limit {
            RPC_REQUESTS_DROPPED.inc();
            debug!(client, "request dropped by rate limiter");
            return Err(RateLimitError::Exceeded(client.to_string()));
        }
        Ok(())
    }

    /// Number of tracked clients (for metrics/debugging).
    pub fn tracked_clients(&self) -> usize {
        self.counters.lock().len()
    }
}
