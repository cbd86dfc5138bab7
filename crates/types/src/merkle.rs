//! Merkle root over ordered action hashes.
//!
//! The tree is built bottom-up over the leaf list. At each level an odd
//! count duplicates the last element so every pair is full; consecutive
//! pairs are concatenated and hashed with BLAKE2b-256 until a single value
//! remains. An empty leaf list yields the zero hash.

use crate::Hash;

/// Compute the Merkle root of an ordered list of leaf hashes.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().expect("level is non-empty");
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Hash two child nodes into their parent.
#[inline]
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    Hash::from_parts(&[left.as_bytes(), right.as_bytes()])
}
