//! Stage 3: deterministic shadow simulation.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_crypto::{hash_canonical, Ed25519Signer, RecordSigner};
use cascade_types::{
    DeterminismProof, Reason, ShadowReport, Signature, StageDecision, StageKind,
};
use chrono::Utc;

use crate::simulator::ShadowSimulator;
use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Runs the simulator and judges its report.
///
/// Determinism is verified here, not trusted: the stage runs the simulator
/// twice with the same seed and compares output hashes. A mismatch means
/// the simulator consulted something outside its inputs, and the request
/// quarantines.
pub struct ShadowStage {
    simulator: Arc<dyn ShadowSimulator>,
    divergence_threshold: f64,
    signer: Ed25519Signer,
}

impl ShadowStage {
    pub const DEFAULT_DIVERGENCE_THRESHOLD: f64 = 0.3;

    pub fn new(simulator: Arc<dyn ShadowSimulator>) -> Self {
        Self::with_threshold(simulator, Self::DEFAULT_DIVERGENCE_THRESHOLD)
    }

    pub fn with_threshold(simulator: Arc<dyn ShadowSimulator>, divergence_threshold: f64) -> Self {
        Self {
            simulator,
            divergence_threshold,
            signer: Ed25519Signer::generate("shadow-runner"),
        }
    }
}

#[async_trait]
impl WaterfallStage for ShadowStage {
    fn kind(&self) -> StageKind {
        StageKind::Shadow
    }

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError> {
        let seed = hash_canonical(&ctx.envelope.signable_content())?;

        let first = self.simulator.simulate(&ctx.envelope, &seed);
        let second = self.simulator.simulate(&ctx.envelope, &seed);
        let first_hash = hash_canonical(&(&seed, &first))?;
        let second_hash = hash_canonical(&(&seed, &second))?;
        let replay_verified = first_hash == second_hash;

        let results = first;
        let timestamp = Utc::now();
        let report = ShadowReport {
            request_id: ctx.envelope.request_id.clone(),
            shadow_job_id: format!("shadow_{}", uuid::Uuid::new_v4()),
            snapshot_id: format!("snap_{}", uuid::Uuid::new_v4()),
            determinism: DeterminismProof {
                seed,
                replay_hash: first_hash.clone(),
                replay_verified,
            },
            results,
            timestamp,
            signature: Signature::new(
                "ed25519",
                self.signer.kid(),
                self.signer.sign(first_hash.as_bytes()),
            ),
        };

        let (decision, reasons) = if !replay_verified {
            (
                StageDecision::Quarantine,
                vec![Reason::new(
                    "SHADOW_NONDETERMINISTIC",
                    "simulator output differed across replays",
                )],
            )
        } else if report.results.has_blocking_violation() {
            let ids: Vec<&str> = report
                .results
                .invariant_violations
                .iter()
                .filter(|v| v.severity.forces_quarantine())
                .map(|v| v.invariant_id.as_str())
                .collect();
            (
                StageDecision::Quarantine,
                vec![Reason::new(
                    "SHADOW_INVARIANT_VIOLATION",
                    format!("simulation predicts invariant violations: {}", ids.join(", ")),
                )],
            )
        } else if report.results.divergence_score > self.divergence_threshold {
            (
                StageDecision::Escalate,
                vec![Reason::new(
                    "SHADOW_DIVERGENCE",
                    format!(
                        "divergence {:.3} exceeds threshold {:.3}",
                        report.results.divergence_score, self.divergence_threshold
                    ),
                )],
            )
        } else {
            (StageDecision::Allow, Vec::new())
        };

        let metadata = serde_json::json!({
            "shadow_job_id": report.shadow_job_id,
            "divergence": report.results.divergence_score,
            "replay_verified": replay_verified,
        });
        ctx.shadow_report = Some(report);
        Ok(StageResult::with_decision(StageKind::Shadow, decision, reasons).with_metadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::PassthroughSimulator;
    use cascade_types::{
        Intent, InvariantViolation, PrincipalId, RequestContext, RequestEnvelope, RequestId,
        RequestTimestamps, ShadowResults, TokenId, ViolationSeverity,
    };
    use std::sync::atomic::{AtomicU64, Ordering};

    fn ctx() -> StageContext {
        StageContext::new(RequestEnvelope {
            request_id: RequestId::generate(),
            actor: PrincipalId::new("did:cascade:test:alice"),
            subject: PrincipalId::new("did:cascade:test:alice"),
            capability_token_id: TokenId::new("cap_1"),
            intent: Intent {
                action: "mutate_state".into(),
                resource: "state://data/k".into(),
                parameters: serde_json::json!({"value": 1}),
                justification: None,
            },
            context: RequestContext::default(),
            timestamps: RequestTimestamps {
                created_at: Utc::now(),
                received_at: None,
            },
            signature: Signature::new("ed25519", "k1", "sig"),
        })
    }

    #[tokio::test]
    async fn deterministic_clean_run_allows() {
        let stage = ShadowStage::new(Arc::new(PassthroughSimulator));
        let mut ctx = ctx();
        let result = stage.evaluate(&mut ctx).await.unwrap();
        assert_eq!(result.decision, StageDecision::Allow);
        let report = ctx.shadow_report.unwrap();
        assert!(report.determinism.replay_verified);
        assert_eq!(report.determinism.replay_hash.len(), 64);
    }

    struct FlakySimulator {
        calls: AtomicU64,
    }

    impl ShadowSimulator for FlakySimulator {
        fn name(&self) -> &str {
            "flaky"
        }

        fn simulate(&self, _envelope: &RequestEnvelope, _seed: &str) -> ShadowResults {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            ShadowResults::with_divergence(n as f64 * 0.01)
        }
    }

    #[tokio::test]
    async fn nondeterminism_quarantines() {
        let stage = ShadowStage::new(Arc::new(FlakySimulator {
            calls: AtomicU64::new(0),
        }));
        let result = stage.evaluate(&mut ctx()).await.unwrap();
        assert_eq!(result.decision, StageDecision::Quarantine);
        assert_eq!(result.reasons[0].code, "SHADOW_NONDETERMINISTIC");
    }

    struct ViolatingSimulator;

    impl ShadowSimulator for ViolatingSimulator {
        fn name(&self) -> &str {
            "violating"
        }

        fn simulate(&self, _envelope: &RequestEnvelope, _seed: &str) -> ShadowResults {
            let mut results = ShadowResults::with_divergence(0.0);
            results.invariant_violations.push(InvariantViolation {
                invariant_id: "INV-BALANCE".into(),
                message: "balance would go negative".into(),
                severity: ViolationSeverity::Critical,
            });
            results
        }
    }

    #[tokio::test]
    async fn predicted_critical_violation_quarantines() {
        let stage = ShadowStage::new(Arc::new(ViolatingSimulator));
        let result = stage.evaluate(&mut ctx()).await.unwrap();
        assert_eq!(result.decision, StageDecision::Quarantine);
        assert_eq!(result.reasons[0].code, "SHADOW_INVARIANT_VIOLATION");
        assert!(result.reasons[0].message.contains("INV-BALANCE"));
    }

    struct DivergentSimulator;

    impl ShadowSimulator for DivergentSimulator {
        fn name(&self) -> &str {
            "divergent"
        }

        fn simulate(&self, _envelope: &RequestEnvelope, _seed: &str) -> ShadowResults {
            ShadowResults::with_divergence(0.6)
        }
    }

    #[tokio::test]
    async fn high_divergence_escalates() {
        let stage = ShadowStage::new(Arc::new(DivergentSimulator));
        let result = stage.evaluate(&mut ctx()).await.unwrap();
        assert_eq!(result.decision, StageDecision::Escalate);
        assert_eq!(result.reasons[0].code, "SHADOW_DIVERGENCE");
    }
}
