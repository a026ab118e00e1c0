//! The stage seam: one trait, one result shape, one shared context.

use async_trait::async_trait;
use cascade_commit::CommitResult;
use cascade_types::{
    CerberusDecision, Reason, RequestEnvelope, ShadowReport, StageDecision, StageKind,
};
use chrono::{DateTime, Utc};

use crate::PipelineError;

/// Outcome of one stage evaluation.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub stage: StageKind,
    pub decision: StageDecision,
    pub reasons: Vec<Reason>,
    /// Stage-specific diagnostics, serialized for the decision response.
    pub metadata: serde_json::Value,
}

impl StageResult {
    pub fn allow(stage: StageKind) -> Self {
        Self {
            stage,
            decision: StageDecision::Allow,
            reasons: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_decision(
        stage: StageKind,
        decision: StageDecision,
        reasons: Vec<Reason>,
    ) -> Self {
        Self {
            stage,
            decision,
            reasons,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Everything a stage may read and the slots later stages fill in.
///
/// The envelope is immutable; stages communicate forward only through their
/// dedicated output slots and the accumulated results.
pub struct StageContext {
    pub envelope: RequestEnvelope,
    pub received_at: DateTime<Utc>,
    /// Worst decision so far; the engine keeps this monotonic.
    pub running: StageDecision,
    pub results: Vec<StageResult>,
    pub shadow_report: Option<ShadowReport>,
    pub cerberus: Option<CerberusDecision>,
    pub commit: Option<CommitResult>,
    pub record_hash: Option<String>,
}

impl StageContext {
    pub fn new(envelope: RequestEnvelope) -> Self {
        Self {
            envelope,
            received_at: Utc::now(),
            running: StageDecision::Allow,
            results: Vec::new(),
            shadow_report: None,
            cerberus: None,
            commit: None,
            record_hash: None,
        }
    }

    /// Every reason recorded by any stage so far.
    pub fn all_reasons(&self) -> Vec<Reason> {
        self.results
            .iter()
            .flat_map(|r| r.reasons.iter().cloned())
            .collect()
    }
}

/// One stage of the waterfall.
#[async_trait]
pub trait WaterfallStage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError>;
}
