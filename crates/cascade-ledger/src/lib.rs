//! Cascade Ledger - the durable, tamper-evident decision record.
//!
//! One [`ExecutionRecord`] is appended per completed pipeline run. Records
//! batch into blocks by height; sealing computes a Merkle root over the
//! ordered record hashes, links the block to its predecessor's hash, and
//! collects a validator signature quorum. Sealed blocks are never mutated;
//! verification re-derives every root and link.
//!
//! [`ExecutionRecord`]: cascade_types::ExecutionRecord

#![deny(unsafe_code)]

pub mod ledger;
pub mod validators;

pub use ledger::DurableLedger;
pub use validators::ValidatorSet;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("record {0} already appended; the ledger never overwrites")]
    DuplicateRecord(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("sealing collected {got} validator signatures; quorum requires {required}")]
    InsufficientSignatures { got: usize, required: usize },

    #[error("record hashing failed: {0}")]
    Hash(#[from] cascade_crypto::HashError),

    #[error("merkle construction failed: {0}")]
    Merkle(#[from] cascade_crypto::MerkleError),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}
