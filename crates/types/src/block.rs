//! Blocks: header, ordered action lists, hashing, and producer signature.
//!
//! The block hash is the doubled BLAKE2b-256 of the header's canonical byte
//! stream with the producer signature excluded, so re-hashing after signing
//! does not change the hash. The transaction root is the Merkle root over
//! all transfer hashes, then all vote hashes, then all execution hashes, in
//! block order.

use crate::{merkle_root, Action, Hash, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};

/// Current protocol version stamped into headers and actions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Domain tag mixed into the block hash.
const BLOCK_HASH_DOMAIN: &[u8] = b"rolldpos.block";

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u32,
    /// Chain identifier.
    pub chain_id: u32,
    /// Height of this block.
    pub height: u64,
    /// Creation time, seconds since the UNIX epoch.
    pub timestamp: u64,
    /// Hash of the parent block; zero for genesis.
    pub prev_hash: Hash,
    /// Merkle root over the ordered action hashes.
    pub tx_root: Hash,
    /// State commitment after applying this block; opaque to consensus.
    pub state_root: Hash,
    /// Block producer's public key; absent on dummy blocks.
    pub producer_pubkey: Option<PublicKey>,
    /// Producer signature over the block hash; absent until signed.
    pub producer_signature: Option<Signature>,
    /// DKG participant identifier, when DKG is active.
    pub dkg_id: Vec<u8>,
    /// DKG group public key share, when DKG is active.
    pub dkg_pubkey: Vec<u8>,
    /// DKG share signature over the previous epoch seed.
    pub dkg_block_signature: Vec<u8>,
}

impl BlockHeader {
    /// Canonical serialization of the header with the producer signature
    /// excluded. Preimage of the block hash.
    fn byte_stream(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(160);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.chain_id.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(self.prev_hash.as_bytes());
        out.extend_from_slice(self.tx_root.as_bytes());
        out.extend_from_slice(self.state_root.as_bytes());
        match &self.producer_pubkey {
            Some(pk) => {
                out.push(1);
                let bytes = pk.to_bytes();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(&bytes);
            }
            None => out.push(0),
        }
        for field in [&self.dkg_id, &self.dkg_pubkey, &self.dkg_block_signature] {
            out.extend_from_slice(&(field.len() as u32).to_le_bytes());
            out.extend_from_slice(field);
        }
        out
    }
}

/// A block: header plus the three ordered action lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered transfers; `transfers[0]` is the coinbase on minted blocks.
    pub transfers: Vec<Action>,
    /// Ordered votes.
    pub votes: Vec<Action>,
    /// Ordered contract executions.
    pub executions: Vec<Action>,
}

impl Block {
    /// Assemble a block and compute its transaction root.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: u32,
        height: u64,
        prev_hash: Hash,
        timestamp: u64,
        transfers: Vec<Action>,
        votes: Vec<Action>,
        executions: Vec<Action>,
    ) -> Self {
        let mut block = Self {
            header: BlockHeader {
                version: PROTOCOL_VERSION,
                chain_id,
                height,
                timestamp,
                prev_hash,
                tx_root: Hash::ZERO,
                state_root: Hash::ZERO,
                producer_pubkey: None,
                producer_signature: None,
                dkg_id: vec![],
                dkg_pubkey: vec![],
                dkg_block_signature: vec![],
            },
            transfers,
            votes,
            executions,
        };
        block.header.tx_root = block.tx_root();
        block
    }

    /// A dummy block: correct height and parent, no actions, no producer.
    ///
    /// Committed on vote timeout to preserve height monotonicity.
    pub fn new_dummy(chain_id: u32, height: u64, prev_hash: Hash, timestamp: u64) -> Self {
        Self::new(chain_id, height, prev_hash, timestamp, vec![], vec![], vec![])
    }

    /// Recompute the Merkle root over the ordered action hashes.
    pub fn tx_root(&self) -> Hash {
        let leaves: Vec<Hash> = self
            .transfers
            .iter()
            .chain(self.votes.iter())
            .chain(self.executions.iter())
            .map(Action::hash)
            .collect();
        merkle_root(&leaves)
    }

    /// The block hash: doubled BLAKE2b over the signature-less header.
    pub fn hash_block(&self) -> Hash {
        let mut preimage = Vec::with_capacity(16 + 160);
        preimage.extend_from_slice(BLOCK_HASH_DOMAIN);
        preimage.extend_from_slice(&self.header.byte_stream());
        Hash::double_from_bytes(&preimage)
    }

    /// Sign the block as its producer.
    pub fn sign(&mut self, key: &KeyPair) {
        self.header.producer_pubkey = Some(key.public_key());
        let hash = self.hash_block();
        self.header.producer_signature = Some(key.sign(hash.as_bytes()));
    }

    /// Verify the producer signature over the block hash.
    pub fn verify_signature(&self) -> Result<(), BlockError> {
        let pubkey = self
            .header
            .producer_pubkey
            .as_ref()
            .ok_or(BlockError::MissingSignature)?;
        let signature = self
            .header
            .producer_signature
            .as_ref()
            .ok_or(BlockError::MissingSignature)?;
        if pubkey.verify(self.hash_block().as_bytes(), signature) {
            Ok(())
        } else {
            Err(BlockError::InvalidSignature)
        }
    }

    /// Check for the dummy-block shape.
    pub fn is_dummy(&self) -> bool {
        self.header.producer_signature.is_none()
            && self.transfers.is_empty()
            && self.votes.is_empty()
            && self.executions.is_empty()
    }

    /// Serialize to the framed wire format: a little-endian u32 length
    /// prefix followed by the encoded block.
    pub fn serialize(&self) -> Result<Vec<u8>, BlockError> {
        let body = bincode::serialize(self).map_err(|e| BlockError::Encode(e.to_string()))?;
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize from the framed wire format.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BlockError> {
        if bytes.len() < 4 {
            return Err(BlockError::Decode("frame too short".to_string()));
        }
        let len = u32::from_le_bytes(bytes[..4].try_into().expect("4-byte slice")) as usize;
        let body = &bytes[4..];
        if body.len() != len {
            return Err(BlockError::Decode(format!(
                "frame length mismatch: prefix {} body {}",
                len,
                body.len()
            )));
        }
        bincode::deserialize(body).map_err(|e| BlockError::Decode(e.to_string()))
    }
}

/// Errors from block signing and serialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// Producer key or signature absent.
    #[error("block is missing producer signature or public key")]
    MissingSignature,

    /// Producer signature does not verify over the block hash.
    #[error("block producer signature verification failed")]
    InvalidSignature,

    /// Wire encoding failed.
    #[error("block encode error: {0}")]
    Encode(String),

    /// Wire decoding failed.
    #[error("block decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_address, test_keypair, test_transfer};
    use crate::Action;

    fn sample_block(key: &KeyPair) -> Block {
        let transfers = vec![
            Action::new_coinbase_transfer(50 << 22, test_address(0)),
            test_transfer(key, 1, 20),
        ];
        let votes = vec![crate::test_utils::test_vote(key, 2, test_address(0))];
        Block::new(1, 3, Hash::from_bytes(b"parent"), 42, transfers, votes, vec![])
    }

    #[test]
    fn test_tx_root_covers_all_action_lists() {
        let key = test_keypair(1);
        let block = sample_block(&key);
        assert_eq!(block.header.tx_root, block.tx_root());

        let mut reordered = block.clone();
        reordered.transfers.swap(0, 1);
        assert_ne!(reordered.tx_root(), block.header.tx_root);
    }

    #[test]
    fn test_hash_stable_under_signing() {
        let key = test_keypair(1);
        let mut block = sample_block(&key);
        let before = block.hash_block();
        block.sign(&key);
        assert_eq!(block.hash_block(), before);
        assert!(block.verify_signature().is_ok());
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let key = test_keypair(1);
        let mut block = sample_block(&key);
        block.sign(&key);
        block.header.height += 1;
        assert_eq!(block.verify_signature(), Err(BlockError::InvalidSignature));
    }

    #[test]
    fn test_unsigned_block_missing_signature() {
        let block = sample_block(&test_keypair(1));
        assert_eq!(block.verify_signature(), Err(BlockError::MissingSignature));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let key = test_keypair(1);
        let mut block = sample_block(&key);
        block.sign(&key);

        let bytes = block.serialize().unwrap();
        let decoded = Block::deserialize(&bytes).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash_block(), block.hash_block());
    }

    #[test]
    fn test_deserialize_rejects_bad_frame() {
        let key = test_keypair(1);
        let bytes = sample_block(&key).serialize().unwrap();
        assert!(Block::deserialize(&bytes[..bytes.len() - 1]).is_err());
        assert!(Block::deserialize(&[0, 0]).is_err());
    }

    #[test]
    fn test_dummy_block_shape() {
        let dummy = Block::new_dummy(1, 7, Hash::from_bytes(b"tip"), 0);
        assert!(dummy.is_dummy());
        assert_eq!(dummy.header.height, 7);
        assert_eq!(dummy.header.tx_root, Hash::ZERO);
    }

    #[test]
    fn test_nonce_fields_survive_roundtrip() {
        let key = test_keypair(2);
        let voter = test_keypair(3);
        let transfers = vec![
            test_transfer(&key, 101, 5),
            test_transfer(&key, 102, 5),
        ];
        let votes = vec![
            crate::test_utils::test_vote(&voter, 103, test_address(0)),
            crate::test_utils::test_vote(&voter, 104, test_address(0)),
        ];
        let block = Block::new(1, 123_456_789, Hash::ZERO, 0, transfers, votes, vec![]);

        let decoded = Block::deserialize(&block.serialize().unwrap()).unwrap();
        assert_eq!(decoded.header.height, 123_456_789);
        assert_eq!(decoded.transfers[0].nonce, 101);
        assert_eq!(decoded.transfers[1].nonce, 102);
        assert_eq!(decoded.votes[0].nonce, 103);
        assert_eq!(decoded.votes[1].nonce, 104);
    }
}
