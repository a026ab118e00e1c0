//! Resilience characteristics of a quorum configuration.

use serde::{Deserialize, Serialize};

use crate::engine::QuorumPolicy;

/// What a quorum configuration can and cannot survive.
///
/// Computed, not asserted: every field follows arithmetically from the
/// policy and head count, so operators can inspect the trade-offs of a
/// configuration before deploying it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceProfile {
    pub policy: String,
    pub head_count: usize,
    /// Byzantine (arbitrarily faulty) heads tolerated without a wrong
    /// decision.
    pub byzantine_tolerance: usize,
    /// Minimum number of heads that must collude to force an allow.
    pub collusion_safety_threshold: usize,
    /// Allow votes needed for approval.
    pub quorum_size: usize,
    /// Crash faults sufficient to block all approvals.
    pub liveness_blocking_faults: usize,
    /// Set when the configuration lets a minority of heads approve.
    pub high_risk: bool,
}

impl ResilienceProfile {
    pub fn for_policy(policy: QuorumPolicy, head_count: usize) -> Self {
        let n = head_count.max(1);
        match policy {
            QuorumPolicy::Unanimous => Self {
                policy: policy.describe(n),
                head_count: n,
                byzantine_tolerance: 0,
                collusion_safety_threshold: n,
                quorum_size: n,
                // One crashed head blocks unanimity forever.
                liveness_blocking_faults: 1,
                high_risk: false,
            },
            QuorumPolicy::KOfN(k) => {
                let k = k.min(n);
                Self {
                    policy: policy.describe(n),
                    head_count: n,
                    byzantine_tolerance: 0,
                    collusion_safety_threshold: k,
                    quorum_size: k,
                    liveness_blocking_faults: n - k + 1,
                    high_risk: 2 * k <= n,
                }
            }
            QuorumPolicy::Bft => {
                let f = n.saturating_sub(1) / 3;
                let quorum = 2 * f + 1;
                Self {
                    policy: policy.describe(n),
                    head_count: n,
                    byzantine_tolerance: f,
                    collusion_safety_threshold: quorum,
                    quorum_size: quorum,
                    liveness_blocking_faults: n - quorum + 1,
                    high_risk: false,
                }
            }
        }
    }
}
