//! Stage 1: known-threat fingerprint matching.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_types::{Reason, StageDecision, StageKind};

use crate::fingerprints::{ThreatFingerprintStore, ThreatSeverity};
use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Matches the request against the fingerprint store.
///
/// Critical or high matches quarantine; medium escalates for mandatory
/// shadow scrutiny; low matches are logged in the metadata but allow.
pub struct SignatureStage {
    fingerprints: Arc<ThreatFingerprintStore>,
}

impl SignatureStage {
    pub fn new(fingerprints: Arc<ThreatFingerprintStore>) -> Self {
        Self { fingerprints }
    }
}

#[async_trait]
impl WaterfallStage for SignatureStage {
    fn kind(&self) -> StageKind {
        StageKind::Signature
    }

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError> {
        let matches = self.fingerprints.matches(&ctx.envelope);
        let worst = matches.iter().map(|f| f.severity).max();

        let (decision, reasons) = match worst {
            Some(severity @ (ThreatSeverity::Critical | ThreatSeverity::High)) => (
                StageDecision::Quarantine,
                vec![Reason::new(
                    "SIG_THREAT_MATCH",
                    format!("{:?}-severity threat fingerprint matched", severity),
                )],
            ),
            Some(ThreatSeverity::Medium) => (
                StageDecision::Escalate,
                vec![Reason::new(
                    "SIG_THREAT_MATCH",
                    "medium-severity threat fingerprint matched",
                )],
            ),
            Some(ThreatSeverity::Low) | None => (StageDecision::Allow, Vec::new()),
        };

        let matched_ids: Vec<&str> = matches.iter().map(|f| f.id.as_str()).collect();
        Ok(
            StageResult::with_decision(StageKind::Signature, decision, reasons).with_metadata(
                serde_json::json!({ "matched_fingerprints": matched_ids }),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::{
        Intent, PrincipalId, RequestContext, RequestEnvelope, RequestId, RequestTimestamps,
        Signature, TokenId,
    };
    use chrono::Utc;

    fn ctx(action: &str, resource: &str) -> StageContext {
        StageContext::new(RequestEnvelope {
            request_id: RequestId::generate(),
            actor: PrincipalId::new("did:cascade:test:alice"),
            subject: PrincipalId::new("did:cascade:test:alice"),
            capability_token_id: TokenId::new("cap_1"),
            intent: Intent {
                action: action.into(),
                resource: resource.into(),
                parameters: serde_json::json!({}),
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
    async fn no_match_allows() {
        let stage = SignatureStage::new(Arc::new(ThreatFingerprintStore::new()));
        let result = stage.evaluate(&mut ctx("read", "state://x")).await.unwrap();
        assert_eq!(result.decision, StageDecision::Allow);
    }

    #[tokio::test]
    async fn severity_maps_onto_the_lattice() {
        let store = Arc::new(ThreatFingerprintStore::new());
        store.add("*", "delete", "*", ThreatSeverity::Critical, "deletion");
        store.add("*", "export", "*", ThreatSeverity::Medium, "exfil pattern");
        store.add("*", "read", "*", ThreatSeverity::Low, "noise");
        let stage = SignatureStage::new(store);

        let result = stage.evaluate(&mut ctx("delete", "state://x")).await.unwrap();
        assert_eq!(result.decision, StageDecision::Quarantine);
        assert_eq!(result.reasons[0].code, "SIG_THREAT_MATCH");

        let result = stage.evaluate(&mut ctx("export", "state://x")).await.unwrap();
        assert_eq!(result.decision, StageDecision::Escalate);

        let result = stage.evaluate(&mut ctx("read", "state://x")).await.unwrap();
        assert_eq!(result.decision, StageDecision::Allow);
    }
}
