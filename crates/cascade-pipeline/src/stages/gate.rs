//! Stage 4: the Cerberus gate.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_liveness::HeadMonitor;
use cascade_quorum::{CerberusHead, QuorumEngine, ThreatModelAnalyzer};
use cascade_types::{StageDecision, StageKind};
use tracing::debug;

use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Fans the request out to every head in parallel, each bounded by the
/// liveness monitor, and aggregates the votes under the quorum policy.
pub struct GateStage {
    heads: Vec<Arc<dyn CerberusHead>>,
    monitor: Arc<HeadMonitor>,
    engine: QuorumEngine,
    analyzer: Option<Arc<ThreatModelAnalyzer>>,
}

impl GateStage {
    pub fn new(
        heads: Vec<Arc<dyn CerberusHead>>,
        monitor: Arc<HeadMonitor>,
        engine: QuorumEngine,
    ) -> Self {
        Self {
            heads,
            monitor,
            engine,
            analyzer: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<ThreatModelAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }
}

#[async_trait]
impl WaterfallStage for GateStage {
    fn kind(&self) -> StageKind {
        StageKind::Gate
    }

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError> {
        let mut tasks = tokio::task::JoinSet::new();
        for head in &self.heads {
            let head = Arc::clone(head);
            let monitor = Arc::clone(&self.monitor);
            let envelope = ctx.envelope.clone();
            tasks.spawn(async move {
                let request_id = envelope.request_id.clone();
                let kind = head.kind();
                monitor.evaluate(request_id, kind, head.vote(&envelope)).await
            });
        }

        let mut votes = Vec::with_capacity(self.heads.len());
        while let Some(joined) = tasks.join_next().await {
            // A panicked head task is equivalent to a missing vote; the
            // aggregation denies on an empty or short vote set.
            if let Ok(vote) = joined {
                debug!(request = %vote.request_id, head = %vote.head, decision = %vote.decision,
                    "gate collected vote");
                votes.push(vote);
            }
        }

        if let Some(analyzer) = &self.analyzer {
            for vote in &votes {
                analyzer.record(vote.request_id.clone(), vote.head, vote.decision);
            }
        }

        let decision = self.engine.aggregate(ctx.envelope.request_id.clone(), votes);
        let reasons = decision
            .votes
            .iter()
            .filter(|v| v.decision != StageDecision::Allow)
            .flat_map(|v| v.reasons.iter().cloned())
            .collect();
        let metadata = serde_json::json!({
            "severity": decision.severity,
            "quorum_required": decision.quorum.required,
            "quorum_achieved": decision.quorum.achieved,
        });
        let final_decision = decision.final_decision;
        ctx.cerberus = Some(decision);
        Ok(StageResult::with_decision(StageKind::Gate, final_decision, reasons)
            .with_metadata(metadata))
    }
}
