//! Shared context of the consensus state machine.
//!
//! The context owns the collaborator handles and the epoch/round state the
//! handlers mutate. Epoch arithmetic, delegate ordering, proposer election,
//! and seed derivation all live here so the state machine itself stays a
//! thin transition table.

use rolldpos_core::{ActPool, Chain, ChainError, Clock, ConsensusConfig, Overlay};
use rolldpos_types::{Address, Block, Hash, KeyPair, PublicKey, Signature};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Domain tag of the epoch seed derivation.
const SEED_DOMAIN: &[u8] = b"rolldpos.seed";

/// Length of the epoch seed in bytes; the genesis seed is all zeros.
pub const SEED_BYTES: usize = 32;

/// Per-epoch context: fixed delegate set and ordering seed.
#[derive(Debug, Clone)]
pub struct EpochCtx {
    /// Epoch number, starting at 1.
    pub num: u64,
    /// Chain height at which the epoch begins.
    pub height: u64,
    /// Sub-epochs per epoch.
    pub num_sub_epochs: u32,
    /// Ordered delegate set.
    pub delegates: Vec<Address>,
    /// Randomness driving delegate ordering; all zeros before the first
    /// DKG-producing epoch.
    pub seed: Vec<u8>,
}

impl Default for EpochCtx {
    fn default() -> Self {
        Self {
            num: 0,
            height: 0,
            num_sub_epochs: 0,
            delegates: Vec::new(),
            seed: vec![0u8; SEED_BYTES],
        }
    }
}

/// Per-round context: candidate block and vote tallies.
#[derive(Debug, Clone, Default)]
pub struct RoundCtx {
    /// Block height being agreed.
    pub height: u64,
    /// Round index inside the epoch.
    pub number: u32,
    /// Expected proposer at round start.
    pub proposer: Address,
    /// The candidate, once received.
    pub block: Option<Block>,
    /// Prevote decisions by delegate; first decision per delegate wins.
    pub prevotes: HashMap<Address, bool>,
    /// Vote decisions by delegate; first decision per delegate wins.
    pub votes: HashMap<Address, bool>,
    /// Delegates whose yes-prevotes formed the lock, carried on view
    /// change.
    pub proof_of_lock: Vec<Address>,
}

/// Shared mutable context passed to every state-machine handler.
pub struct RollDposCtx {
    /// Consensus configuration.
    pub cfg: ConsensusConfig,
    /// This node's address.
    pub addr: Address,
    /// This node's signing key.
    pub key: KeyPair,
    /// This node's DKG share key, once the exchange has run.
    pub dkg_key: Option<KeyPair>,
    /// Blockchain handle.
    pub chain: Arc<dyn Chain>,
    /// Pending-action pool handle.
    pub act_pool: Arc<dyn ActPool>,
    /// Peer-to-peer overlay handle.
    pub overlay: Arc<dyn Overlay>,
    /// Monotonic clock.
    pub clock: Arc<dyn Clock>,
    /// Current epoch context.
    pub epoch: EpochCtx,
    /// Current round context.
    pub round: RoundCtx,
}

impl RollDposCtx {
    /// Create a context with empty epoch and round state.
    pub fn new(
        cfg: ConsensusConfig,
        key: KeyPair,
        chain: Arc<dyn Chain>,
        act_pool: Arc<dyn ActPool>,
        overlay: Arc<dyn Overlay>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let addr = Address::from_pubkey(&key.public_key());
        Self {
            cfg,
            addr,
            key,
            dkg_key: None,
            chain,
            act_pool,
            overlay,
            clock,
            epoch: EpochCtx::default(),
            round: RoundCtx::default(),
        }
    }

    /// Epoch number and start height for the epoch containing `tip + 1`.
    pub fn calc_epoch_num_and_height(&self) -> (u64, u64) {
        let tip = self.chain.tip_height();
        let k = self.cfg.rounds_per_epoch();
        (tip / k + 1, (tip / k) * k + 1)
    }

    /// The delegate set for `epoch_num`: the strongest candidates by vote
    /// weight, put into the order seeded by `seed`.
    pub fn rolling_delegates(
        &self,
        epoch_num: u64,
        seed: &[u8],
    ) -> Result<Vec<Address>, ChainError> {
        let mut candidates = self.chain.candidates_by_height(self.chain.tip_height())?;
        let need = self.cfg.num_delegates as usize;
        if candidates.len() < need {
            return Err(ChainError::Candidates(format!(
                "only {} candidates for a delegate set of {}",
                candidates.len(),
                need
            )));
        }
        candidates.sort_by(|a, b| b.votes.cmp(&a.votes));
        let mut delegates: Vec<Address> = candidates
            .into_iter()
            .take(need)
            .map(|c| c.address)
            .collect();
        sort_candidates(&mut delegates, epoch_num, seed);
        Ok(delegates)
    }

    /// Check whether `addr` is a delegate of the current epoch.
    pub fn is_delegate(&self, addr: &Address) -> bool {
        self.epoch.delegates.contains(addr)
    }

    /// Quorum threshold: strictly more than `2f` of the delegate set.
    pub fn quorum(&self) -> usize {
        let n = self.epoch.delegates.len();
        2 * ((n.saturating_sub(1)) / 3) + 1
    }

    /// The expected proposer for `height`, evaluated now.
    ///
    /// Without time-based rotation the proposer indexes by the height being
    /// agreed. With it, the slot elapsed since the last block advances the
    /// index, so a round that outlives its slot accepts the next proposer
    /// as well.
    pub fn round_proposer(&self, height: u64) -> Address {
        let n = self.epoch.delegates.len() as u64;
        debug_assert!(n > 0, "proposer election without delegates");
        let index = if self.cfg.time_based_rotation {
            let interval = self.cfg.proposer_interval.as_secs().max(1);
            let since = self.duration_since_last_block().as_secs();
            let slot = (since / interval).saturating_sub(1);
            (height + slot) % n
        } else {
            height % n
        };
        self.epoch.delegates[index as usize].clone()
    }

    /// Wall-clock time since the tip block was produced.
    pub fn duration_since_last_block(&self) -> Duration {
        let tip_ts = self
            .chain
            .block_by_height(self.chain.tip_height())
            .map(|b| b.header.timestamp)
            .unwrap_or(0);
        Duration::from_secs(self.clock.unix_secs().saturating_sub(tip_ts))
    }

    /// Mint the candidate block for this round from the action pool.
    ///
    /// Once the DKG exchange has produced a share key, minted blocks carry
    /// the DKG fields: the share signature over the current epoch seed.
    pub fn mint_block(&self) -> Result<Block, ChainError> {
        let (transfers, votes, executions) = self.act_pool.pick_actions();
        match &self.dkg_key {
            Some(dkg_key) => self.chain.mint_new_dkg_block(
                transfers,
                votes,
                executions,
                &self.key,
                Hash::from_bytes(self.addr.as_str().as_bytes())
                    .as_bytes()
                    .to_vec(),
                dkg_key,
                &self.epoch.seed,
            ),
            None => self
                .chain
                .mint_new_block(transfers, votes, executions, &self.key),
        }
    }

    /// Derive the next epoch seed from the DKG block signatures of the
    /// previous epoch's blocks.
    ///
    /// The share signatures are BLS-aggregated and domain-hashed to 32
    /// bytes. When the previous epoch carries no DKG signatures (the first
    /// epochs of a fresh chain), the current seed is kept.
    pub fn update_seed(&self) -> Vec<u8> {
        let tip = self.chain.tip_height();
        let span = self.cfg.rounds_per_epoch().min(tip);
        let mut signatures = Vec::new();
        for height in (tip - span + 1)..=tip {
            let Some(block) = self.chain.block_by_height(height) else {
                continue;
            };
            if !block.header.dkg_block_signature.is_empty() {
                signatures.push(Signature::Bls12381(block.header.dkg_block_signature));
            }
        }
        if signatures.is_empty() {
            debug!("no DKG signatures in previous epoch, keeping seed");
            return self.epoch.seed.clone();
        }
        match Signature::aggregate_bls(&signatures) {
            Ok(aggregate) => Hash::from_parts(&[SEED_DOMAIN, aggregate.as_bytes()])
                .as_bytes()
                .to_vec(),
            Err(e) => {
                warn!(error = %e, "DKG signature aggregation failed, keeping seed");
                self.epoch.seed.clone()
            }
        }
    }
}

/// Put `addresses` into the canonical order for `epoch_num`.
///
/// The order is a deterministic shuffle: addresses sort by the hash of the
/// epoch seed, the epoch number, and the address itself.
pub fn sort_candidates(addresses: &mut [Address], epoch_num: u64, seed: &[u8]) {
    addresses.sort_by_cached_key(|addr| {
        Hash::from_parts(&[seed, &epoch_num.to_le_bytes(), addr.as_str().as_bytes()])
    });
}

/// Verify a block's DKG share signature over `seed` against the DKG public
/// key carried in its header.
pub fn verify_dkg_signature(block: &Block, seed: &[u8]) -> bool {
    if block.header.dkg_pubkey.is_empty() || block.header.dkg_block_signature.is_empty() {
        return false;
    }
    let pubkey = PublicKey::Bls12381(block.header.dkg_pubkey.clone());
    let signature = Signature::Bls12381(block.header.dkg_block_signature.clone());
    pubkey.verify(seed, &signature)
}
