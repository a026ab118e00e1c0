//! The shadow-simulation seam.

use cascade_types::{RequestEnvelope, ShadowResults, SideEffect};

/// A deterministic, side-effect-free simulator of a proposed action.
///
/// Implementations must be pure functions of (envelope, seed): no wall
/// clock, no ambient environment, no real I/O. The shadow stage verifies
/// this by running the simulator twice and comparing output hashes.
pub trait ShadowSimulator: Send + Sync {
    fn name(&self) -> &str;

    fn simulate(&self, envelope: &RequestEnvelope, seed: &str) -> ShadowResults;
}

/// Reference simulator: predicts the declared mutation and nothing else.
///
/// Useful as the default wiring and as the determinism baseline in tests;
/// deployments substitute a domain simulator through the trait.
pub struct PassthroughSimulator;

impl ShadowSimulator for PassthroughSimulator {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn simulate(&self, envelope: &RequestEnvelope, _seed: &str) -> ShadowResults {
        let mut results = ShadowResults::with_divergence(0.0);
        if envelope.intent.action != "read" {
            results.predicted_side_effects.push(SideEffect {
                kind: "state_write".into(),
                target: envelope.intent.resource.clone(),
                description: format!(
                    "{} on {} by {}",
                    envelope.intent.action, envelope.intent.resource, envelope.actor
                ),
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::{
        Intent, PrincipalId, RequestContext, RequestId, RequestTimestamps, Signature, TokenId,
    };
    use chrono::Utc;

    fn envelope(action: &str) -> RequestEnvelope {
        RequestEnvelope {
            request_id: RequestId::new("req_1"),
            actor: PrincipalId::new("did:cascade:test:alice"),
            subject: PrincipalId::new("did:cascade:test:alice"),
            capability_token_id: TokenId::new("cap_1"),
            intent: Intent {
                action: action.into(),
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
        }
    }

    #[test]
    fn output_is_deterministic() {
        let sim = PassthroughSimulator;
        let env = envelope("mutate_state");
        let a = cascade_crypto::hash_canonical(&sim.simulate(&env, "seed")).unwrap();
        let b = cascade_crypto::hash_canonical(&sim.simulate(&env, "seed")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reads_predict_no_side_effects() {
        let sim = PassthroughSimulator;
        assert!(sim
            .simulate(&envelope("read"), "seed")
            .predicted_side_effects
            .is_empty());
        assert_eq!(
            sim.simulate(&envelope("mutate_state"), "seed")
                .predicted_side_effects
                .len(),
            1
        );
    }
}
