//! Pool state.

use parking_lot::Mutex;
use rolldpos_core::{ActPool, PoolError};
use rolldpos_types::{Action, Hash};
use std::collections::HashSet;
use tracing::debug;

/// Pool capacity and per-block gas budget.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum pooled actions across all three classes.
    pub max_actions: usize,
    /// Cumulative gas-limit budget of one `pick_actions` snapshot.
    pub block_gas_limit: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_actions: 16_384,
            block_gas_limit: 10_000_000,
        }
    }
}

#[derive(Default)]
struct PoolInner {
    transfers: Vec<Action>,
    votes: Vec<Action>,
    executions: Vec<Action>,
    seen: HashSet<Hash>,
}

impl PoolInner {
    fn len(&self) -> usize {
        self.transfers.len() + self.votes.len() + self.executions.len()
    }
}

/// In-memory action pool.
///
/// A single mutex guards all three lists so `pick_actions` sees a
/// consistent snapshot against concurrent ingress.
pub struct InMemActPool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl InMemActPool {
    /// Create an empty pool.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Number of pooled actions (for metrics/debugging).
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn admit(&self, inner: &mut PoolInner, action: &Action) -> Result<(), PoolError> {
        if inner.len() >= self.config.max_actions {
            return Err(PoolError::Full);
        }
        let hash = action.hash();
        if inner.seen.contains(&hash) {
            return Err(PoolError::Duplicate(hash));
        }
        action
            .verify_signature()
            .map_err(|e| PoolError::InvalidAction(e.to_string()))?;
        inner.seen.insert(hash);
        Ok(())
    }
}

impl ActPool for InMemActPool {
    fn pick_actions(&self) -> (Vec<Action>, Vec<Action>, Vec<Action>) {
        let inner = self.inner.lock();
        let mut gas_left = self.config.block_gas_limit;
        let mut take = |actions: &[Action]| -> Vec<Action> {
            let mut picked = Vec::new();
            for action in actions {
                if action.gas_limit > gas_left {
                    break;
                }
                gas_left -= action.gas_limit;
                picked.push(action.clone());
            }
            picked
        };
        let transfers = take(&inner.transfers);
        let votes = take(&inner.votes);
        let executions = take(&inner.executions);
        (transfers, votes, executions)
    }

    fn reset(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.len();
        inner.transfers.clear();
        inner.votes.clear();
        inner.executions.clear();
        inner.seen.clear();
        debug!(dropped, "action pool reset");
    }

    fn add_transfer(&self, action: Action) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        self.admit(&mut inner, &action)?;
        inner.transfers.push(action);
        Ok(())
    }

    fn add_vote(&self, action: Action) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        self.admit(&mut inner, &action)?;
        inner.votes.push(action);
        Ok(())
    }

    fn add_execution(&self, action: Action) -> Result<(), PoolError> {
        let mut inner = self.inner.lock();
        self.admit(&mut inner, &action)?;
        inner.executions.push(action);
        Ok(())
    }
}

impl Default for InMemActPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
