//! Committed account state and the candidate table.

use parking_lot::RwLock;
use rolldpos_core::{AccountState, Candidate};
use rolldpos_types::{Action, ActionPayload, Address, Block};
use std::collections::HashMap;

/// Read access to committed per-account state.
///
/// The validator consults this for nonce continuity; the consensus context
/// consults it for the candidate table at epoch boundaries.
pub trait StateFactory: Send + Sync {
    /// Committed state of an account; default state for unknown accounts.
    fn account_state(&self, addr: &Address) -> AccountState;

    /// The candidate table, ordered by vote weight descending.
    fn candidates(&self) -> Vec<Candidate>;
}

/// In-memory state factory.
///
/// Thread-safe; shared between the chain and the validator.
pub struct InMemStateFactory {
    accounts: RwLock<HashMap<Address, AccountState>>,
    candidates: RwLock<Vec<Candidate>>,
}

impl InMemStateFactory {
    /// Create an empty state factory.
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            candidates: RwLock::new(Vec::new()),
        }
    }

    /// Seed an account balance, creating the account if needed.
    pub fn credit(&self, addr: &Address, amount: u128) {
        let mut accounts = self.accounts.write();
        let entry = accounts.entry(addr.clone()).or_default();
        entry.balance = entry.balance.saturating_add(amount);
    }

    /// Replace the candidate table.
    pub fn set_candidates(&self, candidates: Vec<Candidate>) {
        *self.candidates.write() = candidates;
    }

    /// Apply a committed block: bump sender nonces, move transfer amounts,
    /// accumulate candidate votes.
    pub fn apply_block(&self, block: &Block) {
        let mut accounts = self.accounts.write();
        let actions = block
            .transfers
            .iter()
            .chain(block.votes.iter())
            .chain(block.executions.iter());
        for action in actions {
            match &action.payload {
                ActionPayload::Transfer {
                    amount, recipient, ..
                } => {
                    if !action.is_coinbase() {
                        let sender = accounts.entry(action.sender.clone()).or_default();
                        sender.balance = sender.balance.saturating_sub(*amount);
                    }
                    let entry = accounts.entry(recipient.clone()).or_default();
                    entry.balance = entry.balance.saturating_add(*amount);
                }
                ActionPayload::Vote { votee } => {
                    let weight = accounts
                        .get(&action.sender)
                        .map(|a| a.balance)
                        .unwrap_or_default();
                    let mut candidates = self.candidates.write();
                    match candidates.iter_mut().find(|c| &c.address == votee) {
                        Some(candidate) => candidate.votes += weight,
                        None => candidates.push(Candidate {
                            address: votee.clone(),
                            votes: weight,
                        }),
                    }
                }
                ActionPayload::Execution { .. } => {
                    // Execution effects belong to the VM, not consensus.
                }
            }
            self.bump_nonce(&mut accounts, action);
        }
    }

    fn bump_nonce(&self, accounts: &mut HashMap<Address, AccountState>, action: &Action) {
        if action.is_coinbase() {
            return;
        }
        let entry = accounts.entry(action.sender.clone()).or_default();
        if action.nonce > entry.nonce {
            entry.nonce = action.nonce;
        }
    }
}

impl Default for InMemStateFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StateFactory for InMemStateFactory {
    fn account_state(&self, addr: &Address) -> AccountState {
        self.accounts.read().get(addr).copied().unwrap_or_default()
    }

    fn candidates(&self) -> Vec<Candidate> {
        self.candidates.read().clone()
    }
}
