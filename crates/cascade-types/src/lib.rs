//! Cascade Types - canonical data model for the authorization waterfall
//!
//! Every record that flows through the pipeline is defined here: identity
//! documents, capability tokens, request envelopes, shadow reports, quorum
//! decisions, execution records, and ledger blocks. Records are created once
//! by their producing stage and are read-only afterwards.

#![deny(unsafe_code)]

pub mod capability;
pub mod decision;
pub mod identity;
pub mod invariant;
pub mod record;
pub mod request;
pub mod shadow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capability::{
    CapabilityScope, CapabilityToken, DelegationPolicy, ScopeConstraints, TokenBinding, TokenId,
};
pub use decision::{
    CerberusDecision, CerberusVote, CommitPolicy, HeadKind, QuorumInfo, Reason, Severity,
    StageDecision, StageKind,
};
pub use identity::{
    IdentityAttributes, IdentityDocument, PrincipalId, PrincipalKind, PublicKeyEntry,
    RevocationState, RevocationStatus, RiskTier,
};
pub use invariant::{
    EnforcementAction, InvariantDefinition, InvariantScope, InvariantTestCase,
};
pub use record::{ExecutionRecord, LedgerBlock, RecordId, RecordTimestamps, TimeProof};
pub use request::{Intent, RequestContext, RequestEnvelope, RequestId, RequestTimestamps};
pub use shadow::{
    DeterminismProof, InvariantViolation, ResourceEnvelope, ShadowReport, ShadowResults,
    SideEffect, ViolationSeverity,
};

/// A detached signature over a record's content.
///
/// The core treats signing as an external concern; this carries enough to
/// locate the key and verify out-of-band.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature algorithm, e.g. "ed25519".
    pub alg: String,
    /// Key identifier within the signer's identity document.
    pub kid: String,
    /// Hex-encoded signature bytes.
    pub sig: String,
}

impl Signature {
    pub fn new(alg: impl Into<String>, kid: impl Into<String>, sig: impl Into<String>) -> Self {
        Self {
            alg: alg.into(),
            kid: kid.into(),
            sig: sig.into(),
        }
    }
}

/// Errors raised while constructing or validating records.
#[derive(Debug, Error)]
pub enum TypesError {
    #[error("token expiry {expires_at} is not after issuance {issued_at}")]
    ExpiryBeforeIssuance {
        issued_at: chrono::DateTime<chrono::Utc>,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("capability token must carry at least one scope")]
    EmptyScopes,

    #[error("identity document must carry at least one public key")]
    NoPublicKeys,

    #[error("required field missing: {0}")]
    MissingField(&'static str),

    #[error("invariant {0} has immutable scope and cannot be relaxed")]
    ImmutableInvariant(String),
}
