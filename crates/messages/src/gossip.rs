//! Consensus gossip messages: block proposals and the two voting phases.
//!
//! Every message is signed by its sender at construction; receivers check
//! the signature against the embedded public key and then check that the
//! sender is a delegate for the current epoch.

use rolldpos_types::{Address, Block, Hash, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};

const DOMAIN_PROPOSE: &[u8] = b"rolldpos.propose";
const DOMAIN_PREVOTE: &[u8] = b"rolldpos.prevote";
const DOMAIN_VOTE: &[u8] = b"rolldpos.vote";

/// The two BFT voting phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusPhase {
    /// First phase; a yes-quorum unlocks the vote phase.
    Prevote,
    /// Second phase; a yes-quorum commits the block.
    Vote,
}

impl ConsensusPhase {
    fn domain(self) -> &'static [u8] {
        match self {
            ConsensusPhase::Prevote => DOMAIN_PREVOTE,
            ConsensusPhase::Vote => DOMAIN_VOTE,
        }
    }
}

/// A block proposal for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeMsg {
    /// Height of the proposed block.
    pub height: u64,
    /// Round index within the epoch.
    pub round: u32,
    /// The candidate block.
    pub block: Block,
    /// Proposing delegate.
    pub proposer: Address,
    /// Proposer's public key.
    pub proposer_pubkey: PublicKey,
    /// Signature over the proposal payload.
    pub signature: Signature,
}

impl ProposeMsg {
    /// Create and sign a proposal.
    pub fn new(height: u64, round: u32, block: Block, proposer: Address, key: &KeyPair) -> Self {
        let payload = propose_payload(height, round, &block.hash_block(), &proposer);
        Self {
            height,
            round,
            block,
            proposer,
            proposer_pubkey: key.public_key(),
            signature: key.sign(&payload),
        }
    }

    /// Verify the sender signature over the proposal payload.
    pub fn verify(&self) -> bool {
        let payload = propose_payload(
            self.height,
            self.round,
            &self.block.hash_block(),
            &self.proposer,
        );
        self.proposer_pubkey.verify(&payload, &self.signature)
    }
}

/// A prevote or vote endorsement for one candidate block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorseMsg {
    /// Which voting phase this endorsement belongs to.
    pub phase: ConsensusPhase,
    /// Height of the endorsed block.
    pub height: u64,
    /// Round index within the epoch.
    pub round: u32,
    /// Hash of the endorsed block.
    pub block_hash: Hash,
    /// Yes/no decision.
    pub decision: bool,
    /// Endorsing delegate.
    pub endorser: Address,
    /// Endorser's public key.
    pub endorser_pubkey: PublicKey,
    /// Signature over the endorsement payload.
    pub signature: Signature,
}

impl EndorseMsg {
    /// Create and sign an endorsement.
    pub fn new(
        phase: ConsensusPhase,
        height: u64,
        round: u32,
        block_hash: Hash,
        decision: bool,
        endorser: Address,
        key: &KeyPair,
    ) -> Self {
        let payload = endorse_payload(phase, height, round, &block_hash, decision, &endorser);
        Self {
            phase,
            height,
            round,
            block_hash,
            decision,
            endorser,
            endorser_pubkey: key.public_key(),
            signature: key.sign(&payload),
        }
    }

    /// Verify the sender signature over the endorsement payload.
    pub fn verify(&self) -> bool {
        let payload = endorse_payload(
            self.phase,
            self.height,
            self.round,
            &self.block_hash,
            self.decision,
            &self.endorser,
        );
        self.endorser_pubkey.verify(&payload, &self.signature)
    }
}

/// All consensus messages carried by the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMsg {
    /// A block proposal.
    Propose(Box<ProposeMsg>),
    /// A prevote or vote.
    Endorse(EndorseMsg),
}

impl ConsensusMsg {
    /// Message type identifier for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConsensusMsg::Propose(_) => "propose",
            ConsensusMsg::Endorse(e) => match e.phase {
                ConsensusPhase::Prevote => "prevote",
                ConsensusPhase::Vote => "vote",
            },
        }
    }
}

fn propose_payload(height: u64, round: u32, block_hash: &Hash, proposer: &Address) -> Vec<u8> {
    let mut payload = Vec::with_capacity(DOMAIN_PROPOSE.len() + 44 + proposer.as_str().len());
    payload.extend_from_slice(DOMAIN_PROPOSE);
    payload.extend_from_slice(&height.to_le_bytes());
    payload.extend_from_slice(&round.to_le_bytes());
    payload.extend_from_slice(block_hash.as_bytes());
    payload.extend_from_slice(proposer.as_str().as_bytes());
    payload
}

fn endorse_payload(
    phase: ConsensusPhase,
    height: u64,
    round: u32,
    block_hash: &Hash,
    decision: bool,
    endorser: &Address,
) -> Vec<u8> {
    let domain = phase.domain();
    let mut payload = Vec::with_capacity(domain.len() + 45 + endorser.as_str().len());
    payload.extend_from_slice(domain);
    payload.extend_from_slice(&height.to_le_bytes());
    payload.extend_from_slice(&round.to_le_bytes());
    payload.extend_from_slice(block_hash.as_bytes());
    payload.push(u8::from(decision));
    payload.extend_from_slice(endorser.as_str().as_bytes());
    payload
}
