//! Binary Merkle tree over hex-encoded SHA-256 leaf hashes.
//!
//! Standard construction: pair adjacent nodes, hash the concatenated raw
//! digests, and duplicate the last node when a level has an odd count.

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("leaf {index} is not a valid hex digest: {reason}")]
    InvalidLeaf { index: usize, reason: String },
}

/// Compute the Merkle root over an ordered list of hex leaf hashes.
///
/// An empty list roots to the hash of empty input, so "no records" is still
/// a well-defined, verifiable anchor.
pub fn merkle_root(leaves: &[String]) -> Result<String, MerkleError> {
    if leaves.is_empty() {
        let mut hasher = Sha256::new();
        hasher.update(b"");
        return Ok(hex::encode(hasher.finalize()));
    }

    let mut level: Vec<Vec<u8>> = Vec::with_capacity(leaves.len());
    for (index, leaf) in leaves.iter().enumerate() {
        let raw = hex::decode(leaf).map_err(|e| MerkleError::InvalidLeaf {
            index,
            reason: e.to_string(),
        })?;
        level.push(raw);
    }

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Odd count: duplicate the last node.
            level.push(level[level.len() - 1].clone());
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(&pair[0]);
            hasher.update(&pair[1]);
            next.push(hasher.finalize().to_vec());
        }
        level = next;
    }

    Ok(hex::encode(&level[0]))
}

/// Re-derive the root from the leaves and compare against the claimed root.
pub fn verify_root(root: &str, leaves: &[String]) -> bool {
    match merkle_root(leaves) {
        Ok(derived) => derived == root,
        Err(_) => false,
    }
}
