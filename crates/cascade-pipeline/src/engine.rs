//! The waterfall engine: ordered stages, monotonic strictness, fail-safe
//! short-circuits.

use std::sync::Arc;
use std::time::Instant;

use cascade_halt::SafeHaltController;
use cascade_liveness::{DeadlockDetector, DeadlockViolation};
use cascade_types::{
    CerberusDecision, Reason, RequestEnvelope, RequestId, StageDecision, StageKind,
};
use tracing::{info, warn};

use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Final outcome of one pipeline run.
#[derive(Debug)]
pub struct WaterfallResult {
    pub request_id: RequestId,
    pub final_decision: StageDecision,
    /// The stage that stopped forward progress, if any.
    pub aborted_at: Option<StageKind>,
    pub stage_results: Vec<StageResult>,
    /// Content hash of the appended execution record.
    pub record_hash: Option<String>,
    pub decision: Option<CerberusDecision>,
}

impl WaterfallResult {
    pub fn is_allowed(&self) -> bool {
        self.final_decision == StageDecision::Allow
    }
}

/// Drives a request through the stages in order.
///
/// Rules the engine owns, not the stages: the SAFE-HALT latch is checked
/// before stage 0 on every write; the running decision only ever worsens; a
/// non-continuing decision skips the remaining evaluation stages; the commit
/// stage runs only on a clean allow; the ledger stage always runs.
pub struct WaterfallEngine {
    stages: Vec<Arc<dyn WaterfallStage>>,
    halt: Arc<SafeHaltController>,
    deadlock: Arc<DeadlockDetector>,
}

impl WaterfallEngine {
    pub fn new(
        stages: Vec<Arc<dyn WaterfallStage>>,
        halt: Arc<SafeHaltController>,
        deadlock: Arc<DeadlockDetector>,
    ) -> Self {
        Self {
            stages,
            halt,
            deadlock,
        }
    }

    pub async fn process(
        &self,
        envelope: RequestEnvelope,
    ) -> Result<WaterfallResult, PipelineError> {
        // Reads stay permitted under halt for forensics; every write path
        // stops here first.
        if envelope.intent.action != "read" {
            self.halt.check()?;
        }

        let request_id = envelope.request_id.clone();
        self.deadlock.begin(request_id.clone());
        let started = Instant::now();
        let stage_budget = self.deadlock.stage_timeout();
        let total_budget = self.deadlock.total_timeout();
        let mut ctx = StageContext::new(envelope);
        let mut aborted_at: Option<StageKind> = None;

        for stage in &self.stages {
            let kind = stage.kind();
            if aborted_at.is_some() && kind != StageKind::Memory {
                continue;
            }
            // An escalated or quarantined request must not touch canonical
            // state.
            if kind == StageKind::Commit && ctx.running != StageDecision::Allow {
                continue;
            }

            self.deadlock.enter_stage(&request_id, kind);
            // The ledger stage is exempt from the pipeline budget so an
            // overrun still leaves an execution record; it stays bounded by
            // its own stage budget.
            let overran_pipeline =
                kind != StageKind::Memory && started.elapsed() >= total_budget;
            let evaluated = if overran_pipeline {
                None
            } else {
                // Cancellation can only land at an await point; the canonical
                // commit itself is synchronous and cannot be torn.
                tokio::time::timeout(stage_budget, stage.evaluate(&mut ctx))
                    .await
                    .ok()
            };
            let result = match evaluated {
                Some(Ok(result)) => result,
                Some(Err(err)) => {
                    self.deadlock.complete(&request_id);
                    return Err(err);
                }
                None => {
                    let reason = if overran_pipeline {
                        Reason::new(
                            "PIPELINE_TIMEOUT",
                            format!(
                                "request exceeded the {}ms pipeline budget before {}",
                                total_budget.as_millis(),
                                kind.name()
                            ),
                        )
                    } else {
                        Reason::new(
                            "STAGE_TIMEOUT",
                            format!(
                                "stage {} exceeded its {}ms budget",
                                kind.name(),
                                stage_budget.as_millis()
                            ),
                        )
                    };
                    warn!(request = %request_id, stage = kind.name(), code = %reason.code,
                        "stage cancelled over budget");
                    StageResult::with_decision(kind, StageDecision::Deny, vec![reason])
                }
            };

            // Monotonic strictness: a stage may keep or worsen the running
            // decision, never improve it.
            ctx.running = ctx.running.worst_of(result.decision);
            info!(
                request = %request_id,
                stage = kind.name(),
                decision = %result.decision,
                running = %ctx.running,
                "stage evaluated"
            );
            ctx.results.push(result);

            if !ctx.running.continues() && aborted_at.is_none() && kind != StageKind::Memory {
                warn!(request = %request_id, stage = kind.name(), decision = %ctx.running,
                    "pipeline short-circuited");
                aborted_at = Some(kind);
            }
        }

        self.deadlock.complete(&request_id);
        Ok(WaterfallResult {
            request_id,
            final_decision: ctx.running,
            aborted_at,
            stage_results: ctx.results,
            record_hash: ctx.record_hash,
            decision: ctx.cerberus,
        })
    }

    /// Requests currently somewhere between stage 0 and the ledger append.
    pub fn in_flight(&self) -> usize {
        self.deadlock.in_flight_count()
    }

    /// In-flight requests over a stage or pipeline budget.
    pub fn liveness_violations(&self) -> Vec<DeadlockViolation> {
        self.deadlock.violations()
    }
}
