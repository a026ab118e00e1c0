//! Stage 6: the ledger append and the denial feedback loop.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cascade_crypto::hash_canonical;
use cascade_ledger::DurableLedger;
use cascade_types::{
    ExecutionRecord, Reason, RecordId, RecordTimestamps, RequestEnvelope, StageDecision,
    StageKind,
};
use chrono::Utc;
use tracing::info;

use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Invoked for every non-allow outcome, with the accumulated reasons.
/// Wiring it to the fingerprint store closes the denial feedback loop.
pub type DenyFeedbackHook = Box<dyn Fn(&RequestEnvelope, &[Reason]) + Send + Sync>;

/// Builds the execution record and appends it to the ledger.
///
/// Runs for every completed request, allowed or not: the ledger is the
/// memory of denials as much as of commits.
pub struct MemoryStage {
    ledger: Arc<DurableLedger>,
    feedback: Mutex<Option<DenyFeedbackHook>>,
}

impl MemoryStage {
    pub fn new(ledger: Arc<DurableLedger>) -> Self {
        Self {
            ledger,
            feedback: Mutex::new(None),
        }
    }

    pub fn set_deny_feedback(&self, hook: DenyFeedbackHook) {
        if let Ok(mut slot) = self.feedback.lock() {
            *slot = Some(hook);
        }
    }
}

#[async_trait]
impl WaterfallStage for MemoryStage {
    fn kind(&self) -> StageKind {
        StageKind::Memory
    }

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError> {
        let inputs_hash = hash_canonical(&ctx.envelope.signable_content())?;
        let shadow_report_hash = match &ctx.shadow_report {
            Some(report) => hash_canonical(report)?,
            None => String::new(),
        };
        let decision_hash = match &ctx.cerberus {
            Some(decision) => hash_canonical(decision)?,
            None => hash_canonical(&ctx.running)?,
        };
        let diff_hash = ctx
            .commit
            .as_ref()
            .map(|c| c.diff_hash.clone())
            .unwrap_or_default();

        let committed_at = ctx
            .commit
            .as_ref()
            .filter(|c| !c.rolled_back)
            .map(|_| Utc::now());
        let record = ExecutionRecord {
            record_id: RecordId::generate(),
            request_id: ctx.envelope.request_id.clone(),
            actor: ctx.envelope.actor.clone(),
            capability_token_id: ctx.envelope.capability_token_id.clone(),
            inputs_hash,
            shadow_report_hash,
            decision_hash,
            diff_hash,
            final_result: ctx.running,
            lifecycle: RecordTimestamps {
                received_at: ctx.received_at,
                decided_at: Utc::now(),
                committed_at,
            },
            // Countersigned by the ledger's primary validator at append.
            validator_signature: None,
        };

        let record_hash = self.ledger.append(record)?;
        info!(request = %ctx.envelope.request_id, result = %ctx.running, hash = %record_hash,
            "execution recorded");

        if ctx.running != StageDecision::Allow {
            if let Ok(hook) = self.feedback.lock() {
                if let Some(hook) = hook.as_ref() {
                    hook(&ctx.envelope, &ctx.all_reasons());
                }
            }
        }

        let metadata = serde_json::json!({ "record_hash": record_hash });
        ctx.record_hash = Some(record_hash);
        // The ledger append never changes the verdict; it records it.
        Ok(StageResult::with_decision(StageKind::Memory, ctx.running, Vec::new())
            .with_metadata(metadata))
    }
}
