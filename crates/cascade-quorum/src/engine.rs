//! Vote aggregation under a configured quorum policy.

use cascade_types::{
    CerberusDecision, CerberusVote, CommitPolicy, HeadKind, QuorumInfo, RequestId, Severity,
    StageDecision,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How many allow votes it takes to approve a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// Every head must allow.
    Unanimous,
    /// At least `k` heads must allow.
    KOfN(usize),
    /// At least 2f+1 of n heads must allow, f = ⌊(n−1)/3⌋.
    Bft,
}

impl QuorumPolicy {
    pub fn describe(&self, head_count: usize) -> String {
        match self {
            QuorumPolicy::Unanimous => format!("unanimous({head_count})"),
            QuorumPolicy::KOfN(k) => format!("{k}-of-{head_count}"),
            QuorumPolicy::Bft => format!("bft({head_count})"),
        }
    }

    /// Allow votes required over `head_count` heads.
    pub fn required_allows(&self, head_count: usize) -> usize {
        match self {
            QuorumPolicy::Unanimous => head_count,
            QuorumPolicy::KOfN(k) => (*k).min(head_count.max(1)),
            QuorumPolicy::Bft => {
                let f = head_count.saturating_sub(1) / 3;
                2 * f + 1
            }
        }
    }
}

/// Aggregates head votes into a final decision.
///
/// Aggregation is monotonic in the decision lattice: the final decision is
/// at least as strict as the worst vote. An allow quorum can approve a
/// request only when no head voted deny or quarantine - a k-of-n allow
/// majority never outvotes a veto.
pub struct QuorumEngine {
    policy: QuorumPolicy,
}

impl QuorumEngine {
    pub fn new(policy: QuorumPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> QuorumPolicy {
        self.policy
    }

    pub fn aggregate(&self, request_id: RequestId, votes: Vec<CerberusVote>) -> CerberusDecision {
        let required = self.policy.describe(votes.len());

        if votes.is_empty() {
            warn!(request = %request_id, "no head votes collected, denying");
            return CerberusDecision {
                request_id,
                severity: Severity::High,
                final_decision: StageDecision::Deny,
                votes,
                quorum: QuorumInfo {
                    required,
                    achieved: false,
                },
                commit_policy: CommitPolicy::denied(),
                constraints_applied: vec!["no_votes_fail_safe".into()],
                timestamp: Utc::now(),
            };
        }

        let worst = votes
            .iter()
            .map(|v| v.decision)
            .fold(StageDecision::Allow, StageDecision::worst_of);
        let allows = votes
            .iter()
            .filter(|v| v.decision == StageDecision::Allow)
            .count();
        let achieved = allows >= self.policy.required_allows(votes.len());

        let final_decision = if worst == StageDecision::Allow && !achieved {
            StageDecision::Deny
        } else {
            worst
        };

        let invariant_denied = votes
            .iter()
            .any(|v| v.head == HeadKind::Invariant && v.decision == StageDecision::Deny);
        let severity = if invariant_denied {
            Severity::Critical
        } else {
            match final_decision {
                StageDecision::Allow => Severity::Low,
                StageDecision::Escalate => Severity::Medium,
                StageDecision::Quarantine | StageDecision::Deny => Severity::High,
            }
        };

        let allowed = final_decision == StageDecision::Allow && achieved;
        info!(
            request = %request_id,
            decision = %final_decision,
            severity = severity_str(severity),
            achieved,
            "quorum aggregated"
        );

        CerberusDecision {
            request_id,
            severity,
            final_decision,
            votes,
            quorum: QuorumInfo { required, achieved },
            commit_policy: CommitPolicy {
                allowed,
                requires_shadow_hash_match: allowed,
                requires_ledger_append: true,
            },
            constraints_applied: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

fn severity_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}
