//! Canonical SHA-256 hashing over serializable content.

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("content serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Hex-encoded SHA-256 of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 of a value's canonical JSON form.
///
/// serde_json maps are backed by a BTreeMap, so object keys serialize in
/// sorted order and the encoding is stable across processes.
pub fn hash_canonical<T: Serialize>(value: &T) -> Result<String, HashError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hash_bytes(&bytes))
}
