//! Stage decisions, quorum votes, and the aggregated Cerberus decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::RequestId;
use crate::Signature;

/// The decision lattice shared by every pipeline stage and quorum head.
///
/// Variants are ordered from most to least permissive; `worst_of` never
/// improves a running decision (monotonic strictness).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StageDecision {
    Allow,
    Escalate,
    Quarantine,
    Deny,
}

impl StageDecision {
    /// The stricter of two decisions.
    pub fn worst_of(self, other: StageDecision) -> StageDecision {
        self.max(other)
    }

    /// Whether this decision permits the pipeline to continue forward.
    pub fn continues(self) -> bool {
        matches!(self, StageDecision::Allow | StageDecision::Escalate)
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, StageDecision::Allow)
    }
}

impl std::fmt::Display for StageDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageDecision::Allow => "allow",
            StageDecision::Escalate => "escalate",
            StageDecision::Quarantine => "quarantine",
            StageDecision::Deny => "deny",
        };
        write!(f, "{s}")
    }
}

/// The seven waterfall stages, in pipeline order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Structural,
    Signature,
    Behavioral,
    Shadow,
    Gate,
    Commit,
    Memory,
}

impl StageKind {
    pub const ALL: [StageKind; 7] = [
        StageKind::Structural,
        StageKind::Signature,
        StageKind::Behavioral,
        StageKind::Shadow,
        StageKind::Gate,
        StageKind::Commit,
        StageKind::Memory,
    ];

    /// Zero-based position in the pipeline.
    pub fn index(self) -> u8 {
        match self {
            StageKind::Structural => 0,
            StageKind::Signature => 1,
            StageKind::Behavioral => 2,
            StageKind::Shadow => 3,
            StageKind::Gate => 4,
            StageKind::Commit => 5,
            StageKind::Memory => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Structural => "structural",
            StageKind::Signature => "signature",
            StageKind::Behavioral => "behavioral",
            StageKind::Shadow => "shadow",
            StageKind::Gate => "gate",
            StageKind::Commit => "commit",
            StageKind::Memory => "memory",
        }
    }
}

/// The closed set of Cerberus heads whose votes feed the quorum engine.
///
/// The quorum math depends on a known, fixed head count, so this is a tagged
/// enum rather than open plugin dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadKind {
    Identity,
    Capability,
    Invariant,
}

impl std::fmt::Display for HeadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HeadKind::Identity => "identity",
            HeadKind::Capability => "capability",
            HeadKind::Invariant => "invariant",
        };
        write!(f, "{s}")
    }
}

/// A coded, human-readable reason attached to votes and stage results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub code: String,
    pub message: String,
}

impl Reason {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Decision severity, elevated when protected invariants are implicated.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One head's verdict on a request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CerberusVote {
    pub request_id: RequestId,
    pub head: HeadKind,
    pub decision: StageDecision,
    pub reasons: Vec<Reason>,
    pub timestamp: DateTime<Utc>,
    pub signature: Signature,
}

/// Quorum bookkeeping carried on the aggregate decision.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuorumInfo {
    /// Human-readable policy description, e.g. "unanimous(3)" or "bft(7)".
    pub required: String,
    pub achieved: bool,
}

/// What the commit stage is allowed to do with an approved request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommitPolicy {
    pub allowed: bool,
    pub requires_shadow_hash_match: bool,
    pub requires_ledger_append: bool,
}

impl CommitPolicy {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            requires_shadow_hash_match: false,
            requires_ledger_append: true,
        }
    }
}

/// The aggregated quorum decision for one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CerberusDecision {
    pub request_id: RequestId,
    pub severity: Severity,
    pub final_decision: StageDecision,
    pub votes: Vec<CerberusVote>,
    pub quorum: QuorumInfo,
    pub commit_policy: CommitPolicy,
    pub constraints_applied: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl CerberusDecision {
    pub fn is_allowed(&self) -> bool {
        self.final_decision.is_allowed() && self.commit_policy.allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_ordering_is_monotonic() {
        assert!(StageDecision::Allow < StageDecision::Escalate);
        assert!(StageDecision::Escalate < StageDecision::Quarantine);
        assert!(StageDecision::Quarantine < StageDecision::Deny);
        assert_eq!(
            StageDecision::Allow.worst_of(StageDecision::Quarantine),
            StageDecision::Quarantine
        );
        assert_eq!(
            StageDecision::Deny.worst_of(StageDecision::Allow),
            StageDecision::Deny
        );
    }

    #[test]
    fn only_allow_and_escalate_continue() {
        assert!(StageDecision::Allow.continues());
        assert!(StageDecision::Escalate.continues());
        assert!(!StageDecision::Quarantine.continues());
        assert!(!StageDecision::Deny.continues());
    }

    #[test]
    fn stage_indices_are_pipeline_order() {
        for (i, stage) in StageKind::ALL.iter().enumerate() {
            assert_eq!(stage.index() as usize, i);
        }
    }
}
