//! In-memory chain implementing the [`Chain`] contract.
//!
//! The chain uniquely owns committed blocks. Committing applies the block
//! to the state factory, so the validator sees updated nonces on the next
//! round.

use crate::{validation, InMemStateFactory, StateFactory};
use parking_lot::RwLock;
use rolldpos_core::{AccountState, Candidate, Chain, ChainError, Clock, ValidationError};
use rolldpos_types::{Action, Address, Block, Hash, KeyPair};
use std::sync::Arc;
use tracing::info;

/// Default block reward credited by the coinbase transfer.
pub const BLOCK_REWARD: u128 = 50 << 22;

/// An in-memory chain.
pub struct InMemChain {
    chain_id: u32,
    block_reward: u128,
    clock: Arc<dyn Clock>,
    state: Arc<InMemStateFactory>,
    blocks: RwLock<Vec<Block>>,
}

impl InMemChain {
    /// Create an empty chain. The first minted block has height 1 and the
    /// zero hash as its parent.
    pub fn new(chain_id: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            chain_id,
            block_reward: BLOCK_REWARD,
            clock,
            state: Arc::new(InMemStateFactory::new()),
            blocks: RwLock::new(Vec::new()),
        }
    }

    /// Shared handle to the chain's state factory.
    pub fn state(&self) -> Arc<InMemStateFactory> {
        Arc::clone(&self.state)
    }

    fn assemble(
        &self,
        transfers: Vec<Action>,
        votes: Vec<Action>,
        executions: Vec<Action>,
        producer: &KeyPair,
    ) -> Block {
        let producer_addr = Address::from_pubkey(&producer.public_key());
        let coinbase = Action::new_coinbase_transfer(self.block_reward, producer_addr);
        let mut all_transfers = Vec::with_capacity(transfers.len() + 1);
        all_transfers.push(coinbase);
        all_transfers.extend(transfers);

        Block::new(
            self.chain_id,
            self.tip_height() + 1,
            self.tip_hash(),
            self.clock.unix_secs(),
            all_transfers,
            votes,
            executions,
        )
    }
}

impl Chain for InMemChain {
    fn tip_height(&self) -> u64 {
        self.blocks.read().len() as u64
    }

    fn tip_hash(&self) -> Hash {
        self.blocks
            .read()
            .last()
            .map(Block::hash_block)
            .unwrap_or(Hash::ZERO)
    }

    fn candidates_by_height(&self, _height: u64) -> Result<Vec<Candidate>, ChainError> {
        Ok(self.state.candidates())
    }

    fn block_by_height(&self, height: u64) -> Option<Block> {
        if height == 0 {
            return None;
        }
        self.blocks.read().get(height as usize - 1).cloned()
    }

    fn mint_new_block(
        &self,
        transfers: Vec<Action>,
        votes: Vec<Action>,
        executions: Vec<Action>,
        producer: &KeyPair,
    ) -> Result<Block, ChainError> {
        let mut block = self.assemble(transfers, votes, executions, producer);
        block.sign(producer);
        Ok(block)
    }

    fn mint_new_dummy_block(&self) -> Block {
        Block::new_dummy(
            self.chain_id,
            self.tip_height() + 1,
            self.tip_hash(),
            self.clock.unix_secs(),
        )
    }

    fn mint_new_dkg_block(
        &self,
        transfers: Vec<Action>,
        votes: Vec<Action>,
        executions: Vec<Action>,
        producer: &KeyPair,
        dkg_id: Vec<u8>,
        dkg_key: &KeyPair,
        seed: &[u8],
    ) -> Result<Block, ChainError> {
        let mut block = self.assemble(transfers, votes, executions, producer);
        block.header.dkg_id = dkg_id;
        block.header.dkg_pubkey = dkg_key.public_key().to_bytes();
        block.header.dkg_block_signature = dkg_key.sign(seed).as_bytes().to_vec();
        block.sign(producer);
        Ok(block)
    }

    fn validate_block(&self, block: &Block) -> Result<(), ValidationError> {
        validation::validate(block, self.tip_height(), self.tip_hash(), self.state.as_ref())
    }

    fn commit_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut blocks = self.blocks.write();
        // Committing a discontinuous block is a local invariant violation,
        // not a recoverable condition.
        assert_eq!(
            block.header.height,
            blocks.len() as u64 + 1,
            "commit out of order: block height {} on tip {}",
            block.header.height,
            blocks.len()
        );
        self.state.apply_block(block);
        blocks.push(block.clone());
        info!(
            height = block.header.height,
            hash = %block.hash_block(),
            transfers = block.transfers.len(),
            votes = block.votes.len(),
            executions = block.executions.len(),
            dummy = block.is_dummy(),
            "committed block"
        );
        Ok(())
    }

    fn state_by_addr(&self, addr: &Address) -> AccountState {
        self.state.account_state(addr)
    }
}
