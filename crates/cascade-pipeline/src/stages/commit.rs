//! Stage 5: the canonical commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cascade_commit::CommitCoordinator;
use cascade_halt::SafeHaltController;
use cascade_types::{Reason, RequestEnvelope, StageDecision, StageKind};

use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Applies an approved request's mutations to the canonical store.
///
/// Runs only with a quorum decision whose commit policy allows; checks the
/// SAFE-HALT latch immediately before writing. A mid-commit failure rolls
/// the whole batch back and reports a deny, never a partial commit.
pub struct CommitStage {
    coordinator: Arc<CommitCoordinator>,
    halt: Arc<SafeHaltController>,
}

impl CommitStage {
    pub fn new(coordinator: Arc<CommitCoordinator>, halt: Arc<SafeHaltController>) -> Self {
        Self { coordinator, halt }
    }
}

/// Mutations declared by the intent.
///
/// Either an explicit `mutations` array of `{key, value}` objects in the
/// parameters, or a single write of `parameters.value` (falling back to the
/// whole parameters object) to the intent resource.
fn mutations_from_intent(envelope: &RequestEnvelope) -> Vec<(String, serde_json::Value)> {
    let parameters = &envelope.intent.parameters;
    if let Some(list) = parameters.get("mutations").and_then(|m| m.as_array()) {
        return list
            .iter()
            .filter_map(|m| {
                let key = m.get("key")?.as_str()?.to_string();
                let value = m.get("value")?.clone();
                Some((key, value))
            })
            .collect();
    }
    let value = parameters
        .get("value")
        .cloned()
        .unwrap_or_else(|| parameters.clone());
    vec![(envelope.intent.resource.clone(), value)]
}

fn expected_versions(envelope: &RequestEnvelope) -> HashMap<String, u64> {
    envelope
        .intent
        .parameters
        .get("expected_versions")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_u64().map(|ver| (k.clone(), ver)))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl WaterfallStage for CommitStage {
    fn kind(&self) -> StageKind {
        StageKind::Commit
    }

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError> {
        if ctx.envelope.intent.action == "read" {
            return Ok(StageResult::allow(StageKind::Commit));
        }

        let authorized = ctx
            .cerberus
            .as_ref()
            .map(|d| d.commit_policy.allowed)
            .unwrap_or(false);
        if !authorized {
            return Ok(StageResult::with_decision(
                StageKind::Commit,
                StageDecision::Deny,
                vec![Reason::new(
                    "COMMIT_NOT_AUTHORIZED",
                    "no quorum decision authorizes this commit",
                )],
            ));
        }

        // The latch can trip between the gate and here; the write path
        // re-checks at the last moment.
        self.halt.check()?;

        let mutations = mutations_from_intent(&ctx.envelope);
        let expected = expected_versions(&ctx.envelope);
        let result = self
            .coordinator
            .commit(&ctx.envelope.request_id.0, &mutations, &expected)?;

        let stage_result = if result.rolled_back {
            StageResult::with_decision(
                StageKind::Commit,
                StageDecision::Deny,
                vec![Reason::new(
                    "COMMIT_ROLLED_BACK",
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "commit failed and was rolled back".into()),
                )],
            )
            .with_metadata(serde_json::json!({ "rolled_back": true }))
        } else {
            StageResult::allow(StageKind::Commit).with_metadata(serde_json::json!({
                "diff_hash": result.diff_hash,
                "keys_mutated": result.keys_mutated,
            }))
        };
        ctx.commit = Some(result);
        Ok(stage_result)
    }
}
