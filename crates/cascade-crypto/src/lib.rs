//! Cascade Crypto - canonical hashing, Merkle anchoring, and the signing seam.
//!
//! All digests in the system are lowercase hex-encoded SHA-256. Key custody
//! is an external concern; this crate exposes the narrow sign/verify seam the
//! core consumes, with a local Ed25519 implementation for single-process
//! deployments and tests.

#![deny(unsafe_code)]

pub mod hash;
pub mod merkle;
pub mod sign;

pub use hash::{hash_bytes, hash_canonical, HashError};
pub use merkle::{merkle_root, verify_root, MerkleError};
pub use sign::{Ed25519Signer, RecordSigner, RecordVerifier, SignError};
