//! Cascade Pipeline - the waterfall.
//!
//! Every proposed mutation of canonical state flows through seven ordered
//! stages: structural validation, threat-signature matching, behavioral
//! deviation scoring, deterministic shadow simulation, the Cerberus quorum
//! gate, the canonical commit, and the ledger append. Stages can only keep
//! or worsen the running decision; a deny or quarantine short-circuits
//! forward progress, and the ledger stage records the outcome either way.

#![deny(unsafe_code)]

pub mod baseline;
pub mod engine;
pub mod fingerprints;
pub mod simulator;
pub mod stage;
pub mod stages;

pub use baseline::{BaselineConfig, BaselineStore, DeviationScore};
pub use engine::{WaterfallEngine, WaterfallResult};
pub use fingerprints::{ThreatFingerprint, ThreatFingerprintStore, ThreatSeverity};
pub use simulator::{PassthroughSimulator, ShadowSimulator};
pub use stage::{StageContext, StageResult, WaterfallStage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Halted(#[from] cascade_halt::HaltError),

    #[error("identity store failure: {0}")]
    Identity(#[from] cascade_identity::IdentityError),

    #[error("commit failure: {0}")]
    Commit(#[from] cascade_commit::CommitError),

    #[error("ledger failure: {0}")]
    Ledger(#[from] cascade_ledger::LedgerError),

    #[error("hashing failure: {0}")]
    Hash(#[from] cascade_crypto::HashError),

    #[error("pipeline lock poisoned")]
    LockPoisoned,
}
