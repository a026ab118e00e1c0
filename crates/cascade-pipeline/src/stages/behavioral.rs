//! Stage 2: behavioral deviation against the subject's baseline.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_types::{Reason, StageDecision, StageKind};
use chrono::Utc;

use crate::baseline::BaselineStore;
use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Scores the request against the subject's rolling baseline, then folds
/// the request into the baseline regardless of the outcome.
pub struct BehavioralStage {
    baselines: Arc<BaselineStore>,
}

impl BehavioralStage {
    pub fn new(baselines: Arc<BaselineStore>) -> Self {
        Self { baselines }
    }
}

#[async_trait]
impl WaterfallStage for BehavioralStage {
    fn kind(&self) -> StageKind {
        StageKind::Behavioral
    }

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError> {
        let now = Utc::now();
        let subject = &ctx.envelope.subject;
        let action = &ctx.envelope.intent.action;
        let resource = &ctx.envelope.intent.resource;

        let score = self.baselines.score(subject, action, resource, now);
        // Observation happens after scoring so this request never dilutes
        // its own deviation, and happens unconditionally so denied attempts
        // still shape the baseline.
        self.baselines.observe(subject, action, resource, now);

        let config = self.baselines.config();
        let (decision, reasons) = if score.composite >= config.quarantine_threshold {
            (
                StageDecision::Quarantine,
                vec![Reason::new(
                    "BEHAVIOR_DEVIATION",
                    format!("deviation {:.3} at or above quarantine threshold", score.composite),
                )],
            )
        } else if score.composite >= config.escalation_threshold {
            (
                StageDecision::Escalate,
                vec![Reason::new(
                    "BEHAVIOR_DEVIATION",
                    format!("deviation {:.3} at or above escalation threshold", score.composite),
                )],
            )
        } else {
            (StageDecision::Allow, Vec::new())
        };

        Ok(
            StageResult::with_decision(StageKind::Behavioral, decision, reasons).with_metadata(
                serde_json::json!({
                    "composite": score.composite,
                    "rate_anomaly": score.rate_anomaly,
                    "resource_novelty": score.resource_novelty,
                    "action_novelty": score.action_novelty,
                }),
            ),
        )
    }
}
