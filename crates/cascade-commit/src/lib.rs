//! Cascade Commit - the canonical plane.
//!
//! The canonical store is the single owner of mutable application state:
//! a versioned key→value map keyed by resource URI. The commit coordinator
//! is the only writer; it applies a request's mutations atomically, verifies
//! optimistic-concurrency preconditions, and rolls back on any mid-commit
//! failure so partial writes never become visible.

#![deny(unsafe_code)]

pub mod coordinator;
pub mod store;

pub use coordinator::{CommitCoordinator, CommitOutcome, CommitResult, WalEntry};
pub use store::{CanonicalStore, VersionedValue};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("version conflict on {key}: expected {expected}, current {current}")]
    VersionConflict {
        key: String,
        expected: u64,
        current: u64,
    },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("decision does not allow commit: {0}")]
    NotAllowed(String),

    #[error("diff hashing failed: {0}")]
    DiffHash(#[from] cascade_crypto::HashError),

    #[error("store lock poisoned")]
    LockPoisoned,
}
