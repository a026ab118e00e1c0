//! Stage 0: structural validation and replay protection.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_identity::{CapabilityAuthority, NonceCache};
use cascade_types::{Reason, StageDecision, StageKind};
use chrono::{Duration, Utc};

use crate::stage::{StageContext, StageResult, WaterfallStage};
use crate::PipelineError;

/// Checks shape, token freshness, clock skew, and nonce uniqueness.
///
/// The only state this stage touches is the nonce cache, which it must
/// update to make replays detectable.
pub struct StructuralStage {
    authority: Arc<CapabilityAuthority>,
    nonces: Arc<NonceCache>,
    max_clock_skew: Duration,
}

impl StructuralStage {
    pub const DEFAULT_MAX_CLOCK_SKEW_SECONDS: i64 = 300;

    pub fn new(authority: Arc<CapabilityAuthority>, nonces: Arc<NonceCache>) -> Self {
        Self::with_clock_skew(
            authority,
            nonces,
            Duration::seconds(Self::DEFAULT_MAX_CLOCK_SKEW_SECONDS),
        )
    }

    pub fn with_clock_skew(
        authority: Arc<CapabilityAuthority>,
        nonces: Arc<NonceCache>,
        max_clock_skew: Duration,
    ) -> Self {
        Self {
            authority,
            nonces,
            max_clock_skew,
        }
    }

    fn deny(&self, code: &str, message: impl Into<String>) -> StageResult {
        StageResult::with_decision(
            StageKind::Structural,
            StageDecision::Deny,
            vec![Reason::new(code, message)],
        )
    }
}

#[async_trait]
impl WaterfallStage for StructuralStage {
    fn kind(&self) -> StageKind {
        StageKind::Structural
    }

    async fn evaluate(&self, ctx: &mut StageContext) -> Result<StageResult, PipelineError> {
        if let Err(err) = ctx.envelope.validate() {
            return Ok(self.deny("STRUCT_MISSING_FIELD", err.to_string()));
        }

        let now = Utc::now();
        if ctx.envelope.timestamps.created_at > now + self.max_clock_skew {
            return Ok(self.deny(
                "STRUCT_CLOCK_SKEW",
                format!(
                    "created_at {} is more than {}s in the future",
                    ctx.envelope.timestamps.created_at,
                    self.max_clock_skew.num_seconds()
                ),
            ));
        }
        // Stale envelopes are refused outright, which also caps how long an
        // evicted nonce stays replayable.
        if ctx.envelope.timestamps.created_at < now - self.max_clock_skew {
            return Ok(self.deny(
                "STRUCT_STALE_REQUEST",
                format!(
                    "created_at {} is more than {}s in the past",
                    ctx.envelope.timestamps.created_at,
                    self.max_clock_skew.num_seconds()
                ),
            ));
        }

        match self.authority.get(&ctx.envelope.capability_token_id)? {
            Some(token) => {
                if token.is_expired(now) {
                    return Ok(self.deny(
                        "STRUCT_TOKEN_EXPIRED",
                        format!("token {} expired at {}", token.token_id, token.expires_at),
                    ));
                }
                if !self.nonces.record(&token.nonce) {
                    return Ok(self.deny(
                        "STRUCT_NONCE_REPLAY",
                        "nonce already seen (replay attempt)",
                    ));
                }
            }
            None => {
                // Open enrollment relaxes only the token-existence check.
                if self.authority.token_count() > 0 {
                    return Ok(self.deny(
                        "STRUCT_TOKEN_UNKNOWN",
                        format!("token {} is not known", ctx.envelope.capability_token_id),
                    ));
                }
                // A tokenless deployment keeps replay protection, keyed on
                // the envelope's own id.
                if !self.nonces.record(&ctx.envelope.request_id.0) {
                    return Ok(self.deny(
                        "STRUCT_NONCE_REPLAY",
                        "nonce already seen (replay attempt)",
                    ));
                }
            }
        }

        Ok(StageResult::allow(StageKind::Structural))
    }
}
