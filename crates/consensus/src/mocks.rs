//! In-memory collaborator implementations for tests.
//!
//! Each mock records the calls the state machine makes so tests can assert
//! on broadcasts, commits, and pool resets, and each exposes setters for
//! staging the values the state machine will read.

use parking_lot::Mutex;
use rolldpos_core::{
    AccountState, ActPool, Candidate, Chain, ChainError, Clock, Overlay, PoolError,
    TransportError, ValidationError,
};
use rolldpos_messages::ConsensusMsg;
use rolldpos_types::{Action, Address, Block, Hash, KeyPair};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A chain whose reads are staged by the test.
///
/// `commit_block` records the block and advances the tip, so multi-round
/// tests see height progress.
pub struct MockChain {
    tip_height: Mutex<u64>,
    tip_hash: Mutex<Hash>,
    candidates: Mutex<Vec<Candidate>>,
    blocks: Mutex<HashMap<u64, Block>>,
    block_to_mint: Mutex<Option<Block>>,
    validate_error: Mutex<Option<ValidationError>>,
    validate_calls: AtomicUsize,
    committed: Mutex<Vec<Block>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            tip_height: Mutex::new(0),
            tip_hash: Mutex::new(Hash::ZERO),
            candidates: Mutex::new(Vec::new()),
            blocks: Mutex::new(HashMap::new()),
            block_to_mint: Mutex::new(None),
            validate_error: Mutex::new(None),
            validate_calls: AtomicUsize::new(0),
            committed: Mutex::new(Vec::new()),
        }
    }

    /// Stage the committed tip.
    pub fn set_tip(&self, height: u64, hash: Hash) {
        *self.tip_height.lock() = height;
        *self.tip_hash.lock() = hash;
    }

    /// Stage the candidate table.
    pub fn set_candidates(&self, candidates: Vec<Candidate>) {
        *self.candidates.lock() = candidates;
    }

    /// Stage a committed block for `block_by_height`.
    pub fn insert_block(&self, block: Block) {
        self.blocks.lock().insert(block.header.height, block);
    }

    /// Stage the block every mint call returns.
    pub fn set_block_to_mint(&self, block: Block) {
        *self.block_to_mint.lock() = Some(block);
    }

    /// Make `validate_block` fail with `error`.
    pub fn fail_validation(&self, error: ValidationError) {
        *self.validate_error.lock() = Some(error);
    }

    /// Number of `validate_block` calls so far.
    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    /// Blocks committed so far.
    pub fn committed(&self) -> Vec<Block> {
        self.committed.lock().clone()
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain for MockChain {
    fn tip_height(&self) -> u64 {
        *self.tip_height.lock()
    }

    fn tip_hash(&self) -> Hash {
        *self.tip_hash.lock()
    }

    fn candidates_by_height(&self, _height: u64) -> Result<Vec<Candidate>, ChainError> {
        Ok(self.candidates.lock().clone())
    }

    fn block_by_height(&self, height: u64) -> Option<Block> {
        self.blocks.lock().get(&height).cloned()
    }

    fn mint_new_block(
        &self,
        _transfers: Vec<Action>,
        _votes: Vec<Action>,
        _executions: Vec<Action>,
        _producer: &KeyPair,
    ) -> Result<Block, ChainError> {
        self.block_to_mint
            .lock()
            .clone()
            .ok_or_else(|| ChainError::Mint("no block staged".to_string()))
    }

    fn mint_new_dummy_block(&self) -> Block {
        Block::new_dummy(1, self.tip_height() + 1, self.tip_hash(), 0)
    }

    fn mint_new_dkg_block(
        &self,
        transfers: Vec<Action>,
        votes: Vec<Action>,
        executions: Vec<Action>,
        producer: &KeyPair,
        _dkg_id: Vec<u8>,
        _dkg_key: &KeyPair,
        _seed: &[u8],
    ) -> Result<Block, ChainError> {
        self.mint_new_block(transfers, votes, executions, producer)
    }

    fn validate_block(&self, _block: &Block) -> Result<(), ValidationError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        match self.validate_error.lock().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn commit_block(&self, block: &Block) -> Result<(), ChainError> {
        self.committed.lock().push(block.clone());
        self.set_tip(block.header.height, block.hash_block());
        self.blocks.lock().insert(block.header.height, block.clone());
        Ok(())
    }

    fn state_by_addr(&self, _addr: &Address) -> AccountState {
        AccountState::default()
    }
}

/// An action pool returning staged actions and counting resets.
pub struct MockActPool {
    actions: Mutex<(Vec<Action>, Vec<Action>, Vec<Action>)>,
    resets: AtomicUsize,
}

impl MockActPool {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new((Vec::new(), Vec::new(), Vec::new())),
            resets: AtomicUsize::new(0),
        }
    }

    /// Stage the snapshot `pick_actions` returns.
    pub fn set_actions(&self, transfers: Vec<Action>, votes: Vec<Action>, executions: Vec<Action>) {
        *self.actions.lock() = (transfers, votes, executions);
    }

    /// Number of `reset` calls so far.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl Default for MockActPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ActPool for MockActPool {
    fn pick_actions(&self) -> (Vec<Action>, Vec<Action>, Vec<Action>) {
        self.actions.lock().clone()
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn add_transfer(&self, _action: Action) -> Result<(), PoolError> {
        Ok(())
    }

    fn add_vote(&self, _action: Action) -> Result<(), PoolError> {
        Ok(())
    }

    fn add_execution(&self, _action: Action) -> Result<(), PoolError> {
        Ok(())
    }
}

/// An overlay recording every broadcast and tell.
pub struct MockOverlay {
    broadcasts: Mutex<Vec<ConsensusMsg>>,
    tells: Mutex<Vec<(Address, ConsensusMsg)>>,
    fail_sends: AtomicBool,
}

impl MockOverlay {
    pub fn new() -> Self {
        Self {
            broadcasts: Mutex::new(Vec::new()),
            tells: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Make every send fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Broadcasts recorded so far.
    pub fn broadcasts(&self) -> Vec<ConsensusMsg> {
        self.broadcasts.lock().clone()
    }

    /// Point-to-point sends recorded so far.
    pub fn tells(&self) -> Vec<(Address, ConsensusMsg)> {
        self.tells.lock().clone()
    }
}

impl Default for MockOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Overlay for MockOverlay {
    fn broadcast(&self, msg: ConsensusMsg) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock failure".to_string()));
        }
        self.broadcasts.lock().push(msg);
        Ok(())
    }

    fn tell(&self, peer: &Address, msg: ConsensusMsg) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock failure".to_string()));
        }
        self.tells.lock().push((peer.clone(), msg));
        Ok(())
    }

    fn peers(&self) -> Vec<Address> {
        Vec::new()
    }

    fn self_addr(&self) -> Address {
        Address::empty()
    }
}

/// A manually advanced clock.
pub struct MockClock {
    now: Mutex<Duration>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
        }
    }

    /// Advance the clock.
    pub fn add(&self, delta: Duration) {
        *self.now.lock() += delta;
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn unix_secs(&self) -> u64 {
        self.now.lock().as_secs()
    }
}
