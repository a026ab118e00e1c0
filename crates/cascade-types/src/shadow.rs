//! Shadow reports - output of deterministic, side-effect-free simulation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::RequestId;
use crate::Signature;

/// Severity of a predicted invariant violation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Info,
    Warning,
    Critical,
    Fatal,
}

impl ViolationSeverity {
    /// Critical and fatal violations force quarantine upstream.
    pub fn forces_quarantine(self) -> bool {
        matches!(self, ViolationSeverity::Critical | ViolationSeverity::Fatal)
    }
}

/// Proof that the simulation was deterministic and replayable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterminismProof {
    /// PRNG seed derived from a hash of the inputs.
    pub seed: String,
    /// Hash of the simulation output, identical across replays.
    pub replay_hash: String,
    pub replay_verified: bool,
}

/// A predicted invariant violation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub invariant_id: String,
    pub message: String,
    pub severity: ViolationSeverity,
}

/// Resources the simulated action consumed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    pub cpu_ms: u64,
    pub memory_bytes: u64,
    pub io_ops: u64,
}

/// A side effect the simulation predicts the real action would have.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SideEffect {
    pub kind: String,
    pub target: String,
    pub description: String,
}

/// Simulation results evaluated by the shadow stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowResults {
    /// Divergence from expected behavior, clamped to [0, 1].
    pub divergence_score: f64,
    #[serde(default)]
    pub resource_envelope: ResourceEnvelope,
    #[serde(default)]
    pub invariant_violations: Vec<InvariantViolation>,
    #[serde(default)]
    pub privilege_anomalies: Vec<String>,
    #[serde(default)]
    pub predicted_side_effects: Vec<SideEffect>,
}

impl ShadowResults {
    /// Construct with the divergence score clamped into [0, 1].
    pub fn with_divergence(divergence_score: f64) -> Self {
        Self {
            divergence_score: divergence_score.clamp(0.0, 1.0),
            resource_envelope: ResourceEnvelope::default(),
            invariant_violations: Vec::new(),
            privilege_anomalies: Vec::new(),
            predicted_side_effects: Vec::new(),
        }
    }

    pub fn has_blocking_violation(&self) -> bool {
        self.invariant_violations
            .iter()
            .any(|v| v.severity.forces_quarantine())
    }
}

/// Output of one deterministic shadow run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShadowReport {
    pub request_id: RequestId,
    pub shadow_job_id: String,
    pub snapshot_id: String,
    pub determinism: DeterminismProof,
    pub results: ShadowResults,
    pub timestamp: DateTime<Utc>,
    pub signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divergence_is_clamped() {
        assert_eq!(ShadowResults::with_divergence(1.7).divergence_score, 1.0);
        assert_eq!(ShadowResults::with_divergence(-0.3).divergence_score, 0.0);
        assert_eq!(ShadowResults::with_divergence(0.4).divergence_score, 0.4);
    }

    #[test]
    fn critical_violations_block() {
        let mut results = ShadowResults::with_divergence(0.0);
        assert!(!results.has_blocking_violation());

        results.invariant_violations.push(InvariantViolation {
            invariant_id: "INV-001".into(),
            message: "warning only".into(),
            severity: ViolationSeverity::Warning,
        });
        assert!(!results.has_blocking_violation());

        results.invariant_violations.push(InvariantViolation {
            invariant_id: "INV-002".into(),
            message: "critical".into(),
            severity: ViolationSeverity::Critical,
        });
        assert!(results.has_blocking_violation());
    }
}
