//! The three Cerberus heads and their deny-reason taxonomy.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cascade_crypto::{Ed25519Signer, RecordSigner};
use cascade_identity::{CapabilityAuthority, DeviceAttestationRegistry, IdentityDocumentStore};
use cascade_types::{
    CerberusVote, EnforcementAction, HeadKind, InvariantDefinition, InvariantScope,
    InvariantTestCase, Reason, RequestEnvelope, RiskTier, Signature, StageDecision, TokenId,
    ViolationSeverity,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

/// One head of the Cerberus gate.
///
/// Heads never mutate state; they read their backing stores and vote.
#[async_trait]
pub trait CerberusHead: Send + Sync {
    fn kind(&self) -> HeadKind;

    async fn vote(&self, envelope: &RequestEnvelope) -> CerberusVote;
}

fn signed_vote(
    signer: &Ed25519Signer,
    envelope: &RequestEnvelope,
    head: HeadKind,
    decision: StageDecision,
    reasons: Vec<Reason>,
) -> CerberusVote {
    let timestamp = Utc::now();
    let content = serde_json::json!({
        "request_id": envelope.request_id,
        "head": head,
        "decision": decision,
        "reasons": reasons,
        "timestamp": timestamp,
    });
    let sig = signer.sign(content.to_string().as_bytes());
    debug!(request = %envelope.request_id, head = %head, %decision, "head voted");
    CerberusVote {
        request_id: envelope.request_id.clone(),
        head,
        decision,
        reasons,
        timestamp,
        signature: Signature::new("ed25519", signer.kid(), sig),
    }
}

/// Votes on who the actor is: DID shape, document presence, revocation,
/// key validity, optional device attestation and risk-tier ceiling.
///
/// With an empty document store the head runs in open enrollment and allows
/// every well-formed DID.
pub struct IdentityHead {
    documents: Arc<IdentityDocumentStore>,
    devices: Option<Arc<DeviceAttestationRegistry>>,
    max_risk_tier: Option<RiskTier>,
    signer: Ed25519Signer,
}

impl IdentityHead {
    pub fn new(documents: Arc<IdentityDocumentStore>) -> Self {
        Self {
            documents,
            devices: None,
            max_risk_tier: None,
            signer: Ed25519Signer::generate("head-identity"),
        }
    }

    pub fn with_device_attestation(mut self, devices: Arc<DeviceAttestationRegistry>) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn with_max_risk_tier(mut self, tier: RiskTier) -> Self {
        self.max_risk_tier = Some(tier);
        self
    }

    fn deny_reasons(&self, envelope: &RequestEnvelope) -> Vec<Reason> {
        if !envelope.actor.is_valid_did() {
            return vec![Reason::new(
                "IDENTITY_INVALID_DID_FORMAT",
                format!("actor id '{}' is not a did:<method>:<id>", envelope.actor),
            )];
        }
        if self.documents.is_empty() {
            // Open enrollment: nothing registered yet, nothing to check
            // against.
            return Vec::new();
        }

        let document = match self.documents.get(&envelope.actor) {
            Ok(Some(document)) => document,
            _ => {
                return vec![Reason::new(
                    "IDENTITY_NOT_FOUND",
                    format!("no identity document for {}", envelope.actor),
                )]
            }
        };
        if document.is_revoked() {
            return vec![Reason::new(
                "IDENTITY_REVOKED",
                format!("identity {} is revoked", envelope.actor),
            )];
        }
        if !document.has_valid_key(Utc::now()) {
            return vec![Reason::new(
                "IDENTITY_NO_VALID_KEY",
                format!("identity {} has no unexpired public key", envelope.actor),
            )];
        }
        if let Some(devices) = &self.devices {
            let trusted = envelope
                .context
                .device_attestation
                .as_deref()
                .map(|proof| devices.is_trusted(&envelope.actor, proof))
                .unwrap_or(false);
            if !trusted {
                return vec![Reason::new(
                    "IDENTITY_DEVICE_UNTRUSTED",
                    "request device attestation is missing or untrusted",
                )];
            }
        }
        if let Some(ceiling) = self.max_risk_tier {
            if document.attributes.risk_tier > ceiling {
                return vec![Reason::new(
                    "IDENTITY_RISK_TIER_EXCEEDED",
                    format!(
                        "risk tier {:?} exceeds the permitted ceiling {:?}",
                        document.attributes.risk_tier, ceiling
                    ),
                )];
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl CerberusHead for IdentityHead {
    fn kind(&self) -> HeadKind {
        HeadKind::Identity
    }

    async fn vote(&self, envelope: &RequestEnvelope) -> CerberusVote {
        let reasons = self.deny_reasons(envelope);
        let decision = if reasons.is_empty() {
            StageDecision::Allow
        } else {
            StageDecision::Deny
        };
        signed_vote(&self.signer, envelope, HeadKind::Identity, decision, reasons)
    }
}

/// Votes on what the actor may do: token presence, revocation, expiry, scope
/// coverage (including zone restrictions), per-scope rate ceilings, and
/// subject binding.
///
/// With no tokens ever issued the head runs open and allows.
pub struct CapabilityHead {
    authority: Arc<CapabilityAuthority>,
    usage: RwLock<HashMap<TokenId, VecDeque<DateTime<Utc>>>>,
    signer: Ed25519Signer,
}

impl CapabilityHead {
    pub fn new(authority: Arc<CapabilityAuthority>) -> Self {
        Self {
            authority,
            usage: RwLock::new(HashMap::new()),
            signer: Ed25519Signer::generate("head-capability"),
        }
    }

    /// Count this exercise of the token against `limit` per minute. False
    /// once the trailing-minute count exceeds the limit.
    fn within_rate(&self, token_id: &TokenId, now: DateTime<Utc>, limit: u32) -> bool {
        let mut usage = match self.usage.write() {
            Ok(usage) => usage,
            // A poisoned gauge must not turn into an allow.
            Err(_) => return false,
        };
        let window = usage.entry(token_id.clone()).or_default();
        let horizon = now - Duration::seconds(60);
        while window.front().map(|t| *t < horizon).unwrap_or(false) {
            window.pop_front();
        }
        window.push_back(now);
        window.len() <= limit as usize
    }

    fn deny_reasons(&self, envelope: &RequestEnvelope) -> Vec<Reason> {
        if self.authority.token_count() == 0 {
            return Vec::new();
        }

        let token = match self.authority.get(&envelope.capability_token_id) {
            Ok(Some(token)) => token,
            _ => {
                return vec![Reason::new(
                    "CAP_TOKEN_NOT_FOUND",
                    format!("token {} is unknown", envelope.capability_token_id),
                )]
            }
        };
        if self.authority.is_revoked(&token.token_id) {
            return vec![Reason::new(
                "CAP_TOKEN_REVOKED",
                format!("token {} has been revoked", token.token_id),
            )];
        }
        let now = Utc::now();
        if token.is_expired(now) {
            return vec![Reason::new(
                "CAP_TOKEN_EXPIRED",
                format!("token {} expired at {}", token.token_id, token.expires_at),
            )];
        }
        // Tokens bind to their subject; only a delegable token may be
        // exercised by a different actor.
        if token.subject != envelope.actor && !token.delegation.delegable {
            return vec![Reason::new(
                "CAP_SUBJECT_MISMATCH",
                format!(
                    "token {} is bound to {} and is not delegable",
                    token.token_id, token.subject
                ),
            )];
        }
        let zone = envelope.context.zone.as_deref();
        let covering = token.covering_scopes(
            &envelope.intent.action,
            &envelope.intent.resource,
            now,
            zone,
        );
        if covering.is_empty() {
            return vec![Reason::new(
                "CAP_SCOPE_DENIED",
                format!(
                    "no scope covers action '{}' on '{}' from zone {:?}",
                    envelope.intent.action, envelope.intent.resource, zone
                ),
            )];
        }
        let limit = covering
            .iter()
            .filter_map(|s| s.constraints.max_rate_per_minute)
            .min();
        if let Some(limit) = limit {
            if !self.within_rate(&token.token_id, now, limit) {
                return vec![Reason::new(
                    "CAP_RATE_EXCEEDED",
                    format!(
                        "token {} exceeded its scope ceiling of {} requests per minute",
                        token.token_id, limit
                    ),
                )];
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl CerberusHead for CapabilityHead {
    fn kind(&self) -> HeadKind {
        HeadKind::Capability
    }

    async fn vote(&self, envelope: &RequestEnvelope) -> CerberusVote {
        let reasons = self.deny_reasons(envelope);
        let decision = if reasons.is_empty() {
            StageDecision::Allow
        } else {
            StageDecision::Deny
        };
        signed_vote(&self.signer, envelope, HeadKind::Capability, decision, reasons)
    }
}

/// Votes on whether the request touches protected system state.
///
/// The head enforces governance-signed [`InvariantDefinition`]s. A
/// definition whose embedded test cases fail is refused at construction and
/// never enforced. Mutations matching a definition draw the vote its
/// enforcement action demands; reads pass. The default set protects
/// invariant definitions, quorum configuration, and ledger entries.
pub struct InvariantHead {
    definitions: Vec<InvariantDefinition>,
    signer: Ed25519Signer,
}

impl InvariantHead {
    pub fn new(definitions: Vec<InvariantDefinition>) -> Self {
        let (kept, refused): (Vec<_>, Vec<_>) =
            definitions.into_iter().partition(|d| d.self_check());
        for definition in &refused {
            warn!(invariant = %definition.invariant_id,
                "definition failed its embedded test cases and will not be enforced");
        }
        Self {
            definitions: kept,
            signer: Ed25519Signer::generate("head-invariant"),
        }
    }

    pub fn with_defaults() -> Self {
        let governance = Ed25519Signer::generate("governance-root");
        let definitions = [
            ("INV_IMMUTABLE_STATE", "invariant://"),
            ("INV_QUORUM_CONFIG", "quorum://config"),
            ("INV_LEDGER_APPEND_ONLY", "ledger://"),
        ]
        .into_iter()
        .map(|(id, prefix)| {
            let mut definition = InvariantDefinition {
                invariant_id: id.to_string(),
                scope: InvariantScope::Immutable,
                severity: ViolationSeverity::Fatal,
                enforcement: EnforcementAction::HardDeny,
                expression: format!("protect_prefix:{prefix}"),
                test_cases: vec![
                    InvariantTestCase {
                        input: serde_json::json!({ "resource": format!("{prefix}entry") }),
                        expect_violation: true,
                    },
                    InvariantTestCase {
                        input: serde_json::json!({ "resource": "state://data/ordinary" }),
                        expect_violation: false,
                    },
                ],
                signature: Signature::new("ed25519", "", ""),
            };
            let content = definition.signable_content().to_string();
            definition.signature = Signature::new(
                "ed25519",
                governance.kid(),
                governance.sign(content.as_bytes()),
            );
            definition
        })
        .collect();
        Self::new(definitions)
    }

    pub fn definitions(&self) -> &[InvariantDefinition] {
        &self.definitions
    }

    fn decision_for(enforcement: EnforcementAction) -> StageDecision {
        match enforcement {
            EnforcementAction::HardDeny => StageDecision::Deny,
            EnforcementAction::Quarantine => StageDecision::Quarantine,
            // Enforcement this head cannot apply by itself goes to an
            // operator.
            EnforcementAction::RateLimit
            | EnforcementAction::RequireShadow
            | EnforcementAction::RequireQuorum => StageDecision::Escalate,
        }
    }

    fn violations(&self, envelope: &RequestEnvelope) -> (StageDecision, Vec<Reason>) {
        if envelope.intent.action == "read" {
            return (StageDecision::Allow, Vec::new());
        }
        let mut decision = StageDecision::Allow;
        let mut reasons = Vec::new();
        for definition in &self.definitions {
            if definition.applies_to(&envelope.intent.resource) {
                decision = decision.worst_of(Self::decision_for(definition.enforcement));
                reasons.push(Reason::new(
                    format!("INVARIANT_VIOLATION:{}", definition.invariant_id),
                    format!(
                        "mutation of '{}' violates invariant {}",
                        envelope.intent.resource, definition.invariant_id
                    ),
                ));
            }
        }
        (decision, reasons)
    }
}

#[async_trait]
impl CerberusHead for InvariantHead {
    fn kind(&self) -> HeadKind {
        HeadKind::Invariant
    }

    async fn vote(&self, envelope: &RequestEnvelope) -> CerberusVote {
        let (decision, reasons) = self.violations(envelope);
        signed_vote(&self.signer, envelope, HeadKind::Invariant, decision, reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::{
        CapabilityScope, DelegationPolicy, IdentityAttributes, IdentityDocument, Intent,
        PrincipalId, PrincipalKind, PublicKeyEntry, RequestContext, RequestId,
        RequestTimestamps, RevocationStatus, ScopeConstraints, TokenBinding, TokenId,
    };
    use chrono::Duration;

    fn envelope(actor: &str, token_id: &str, action: &str, resource: &str) -> RequestEnvelope {
        RequestEnvelope {
            request_id: RequestId::generate(),
            actor: PrincipalId::new(actor),
            subject: PrincipalId::new(actor),
            capability_token_id: TokenId::new(token_id),
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
        }
    }

    fn document(id: &str) -> IdentityDocument {
        IdentityDocument {
            id: PrincipalId::new(id),
            kind: PrincipalKind::Agent,
            public_keys: vec![PublicKeyEntry {
                kid: "k1".into(),
                kty: "ed25519".into(),
                pub_key: "aabb".into(),
                created: Utc::now(),
                expires: Utc::now() + Duration::days(30),
            }],
            attributes: IdentityAttributes {
                org: "ops".into(),
                role: "worker".into(),
                risk_tier: RiskTier::Low,
            },
            revocation: RevocationStatus::active(),
            signature: Signature::new("ed25519", "k1", "sig"),
        }
    }

    fn code(vote: &CerberusVote) -> &str {
        &vote.reasons[0].code
    }

    #[tokio::test]
    async fn identity_head_open_enrollment_allows() {
        let head = IdentityHead::new(Arc::new(IdentityDocumentStore::new()));
        let vote = head
            .vote(&envelope("did:cascade:test:alice", "cap_1", "read", "state://x"))
            .await;
        assert_eq!(vote.decision, StageDecision::Allow);
    }

    #[tokio::test]
    async fn identity_head_rejects_malformed_did() {
        let head = IdentityHead::new(Arc::new(IdentityDocumentStore::new()));
        let vote = head
            .vote(&envelope("not-a-did", "cap_1", "read", "state://x"))
            .await;
        assert_eq!(vote.decision, StageDecision::Deny);
        assert_eq!(code(&vote), "IDENTITY_INVALID_DID_FORMAT");
    }

    #[tokio::test]
    async fn identity_head_taxonomy() {
        let store = Arc::new(IdentityDocumentStore::new());
        store.register(document("did:cascade:test:alice")).unwrap();
        let head = IdentityHead::new(store.clone());

        let vote = head
            .vote(&envelope("did:cascade:test:mallory", "cap_1", "read", "state://x"))
            .await;
        assert_eq!(code(&vote), "IDENTITY_NOT_FOUND");

        store
            .revoke(&PrincipalId::new("did:cascade:test:alice"), "compromised")
            .unwrap();
        let vote = head
            .vote(&envelope("did:cascade:test:alice", "cap_1", "read", "state://x"))
            .await;
        assert_eq!(code(&vote), "IDENTITY_REVOKED");
    }

    #[tokio::test]
    async fn identity_head_risk_tier_ceiling() {
        let store = Arc::new(IdentityDocumentStore::new());
        let mut doc = document("did:cascade:test:alice");
        doc.attributes.risk_tier = RiskTier::Critical;
        store.register(doc).unwrap();
        let head = IdentityHead::new(store).with_max_risk_tier(RiskTier::Medium);
        let vote = head
            .vote(&envelope("did:cascade:test:alice", "cap_1", "read", "state://x"))
            .await;
        assert_eq!(code(&vote), "IDENTITY_RISK_TIER_EXCEEDED");
    }

    #[tokio::test]
    async fn identity_head_device_attestation() {
        let store = Arc::new(IdentityDocumentStore::new());
        store.register(document("did:cascade:test:alice")).unwrap();
        let devices = Arc::new(DeviceAttestationRegistry::new());
        devices
            .register_device(PrincipalId::new("did:cascade:test:alice"), "sha256:laptop")
            .unwrap();
        let head = IdentityHead::new(store).with_device_attestation(devices);

        let mut env = envelope("did:cascade:test:alice", "cap_1", "read", "state://x");
        let vote = head.vote(&env).await;
        assert_eq!(code(&vote), "IDENTITY_DEVICE_UNTRUSTED");

        env.context.device_attestation = Some("sha256:laptop".into());
        let vote = head.vote(&env).await;
        assert_eq!(vote.decision, StageDecision::Allow);
    }

    fn authority_with_token() -> (Arc<CapabilityAuthority>, TokenId) {
        let authority = Arc::new(CapabilityAuthority::new(PrincipalId::new("did:cascade:ca")));
        let token = authority
            .issue(
                PrincipalId::new("did:cascade:test:alice"),
                vec![CapabilityScope {
                    resource: "state://data/*".into(),
                    actions: vec!["read".into(), "mutate_state".into()],
                    constraints: ScopeConstraints::default(),
                }],
                TokenBinding {
                    client_proof: "sha256:aabb".into(),
                },
                DelegationPolicy::default(),
            )
            .unwrap();
        (authority, token.token_id)
    }

    #[tokio::test]
    async fn capability_head_allows_covered_request() {
        let (authority, token_id) = authority_with_token();
        let head = CapabilityHead::new(authority);
        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                &token_id.0,
                "mutate_state",
                "state://data/key1",
            ))
            .await;
        assert_eq!(vote.decision, StageDecision::Allow);
    }

    #[tokio::test]
    async fn capability_head_taxonomy() {
        let (authority, token_id) = authority_with_token();
        let head = CapabilityHead::new(authority.clone());

        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                "cap_unknown",
                "read",
                "state://data/x",
            ))
            .await;
        assert_eq!(code(&vote), "CAP_TOKEN_NOT_FOUND");

        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                &token_id.0,
                "delete",
                "state://data/x",
            ))
            .await;
        assert_eq!(code(&vote), "CAP_SCOPE_DENIED");

        let vote = head
            .vote(&envelope(
                "did:cascade:test:mallory",
                &token_id.0,
                "read",
                "state://data/x",
            ))
            .await;
        assert_eq!(code(&vote), "CAP_SUBJECT_MISMATCH");

        authority.revoke(&token_id, None).unwrap();
        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                &token_id.0,
                "read",
                "state://data/x",
            ))
            .await;
        assert_eq!(code(&vote), "CAP_TOKEN_REVOKED");
    }

    #[tokio::test]
    async fn capability_head_zone_restricted_scope() {
        let authority = Arc::new(CapabilityAuthority::new(PrincipalId::new("did:cascade:ca")));
        let token = authority
            .issue(
                PrincipalId::new("did:cascade:test:alice"),
                vec![CapabilityScope {
                    resource: "state://data/*".into(),
                    actions: vec!["read".into()],
                    constraints: ScopeConstraints {
                        zone: Some("eu-west".into()),
                        ..ScopeConstraints::default()
                    },
                }],
                TokenBinding {
                    client_proof: "sha256:aabb".into(),
                },
                DelegationPolicy::default(),
            )
            .unwrap();
        let head = CapabilityHead::new(authority);

        let mut env = envelope(
            "did:cascade:test:alice",
            &token.token_id.0,
            "read",
            "state://data/x",
        );
        let vote = head.vote(&env).await;
        assert_eq!(code(&vote), "CAP_SCOPE_DENIED");

        env.context.zone = Some("eu-west".into());
        let vote = head.vote(&env).await;
        assert_eq!(vote.decision, StageDecision::Allow);
    }

    #[tokio::test]
    async fn capability_head_scope_rate_ceiling() {
        let authority = Arc::new(CapabilityAuthority::new(PrincipalId::new("did:cascade:ca")));
        let token = authority
            .issue(
                PrincipalId::new("did:cascade:test:alice"),
                vec![CapabilityScope {
                    resource: "state://data/*".into(),
                    actions: vec!["read".into()],
                    constraints: ScopeConstraints {
                        max_rate_per_minute: Some(2),
                        ..ScopeConstraints::default()
                    },
                }],
                TokenBinding {
                    client_proof: "sha256:aabb".into(),
                },
                DelegationPolicy::default(),
            )
            .unwrap();
        let head = CapabilityHead::new(authority);
        let env = envelope(
            "did:cascade:test:alice",
            &token.token_id.0,
            "read",
            "state://data/x",
        );

        assert_eq!(head.vote(&env).await.decision, StageDecision::Allow);
        assert_eq!(head.vote(&env).await.decision, StageDecision::Allow);
        let vote = head.vote(&env).await;
        assert_eq!(vote.decision, StageDecision::Deny);
        assert_eq!(code(&vote), "CAP_RATE_EXCEEDED");
    }

    fn signed_definition(
        id: &str,
        prefix: &str,
        enforcement: EnforcementAction,
    ) -> InvariantDefinition {
        InvariantDefinition {
            invariant_id: id.into(),
            scope: InvariantScope::Constitutional,
            severity: ViolationSeverity::Critical,
            enforcement,
            expression: format!("protect_prefix:{prefix}"),
            test_cases: vec![],
            signature: Signature::new("ed25519", "gov", "sig"),
        }
    }

    #[tokio::test]
    async fn invariant_head_honors_enforcement_actions() {
        let head = InvariantHead::new(vec![signed_definition(
            "INV_STAGING_FREEZE",
            "state://staging/",
            EnforcementAction::Quarantine,
        )]);
        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                "cap_1",
                "mutate_state",
                "state://staging/k",
            ))
            .await;
        assert_eq!(vote.decision, StageDecision::Quarantine);
        assert_eq!(code(&vote), "INVARIANT_VIOLATION:INV_STAGING_FREEZE");
    }

    #[tokio::test]
    async fn invariant_head_refuses_self_failing_definitions() {
        let mut broken = signed_definition(
            "INV_BROKEN",
            "state://frozen/",
            EnforcementAction::HardDeny,
        );
        // The case claims an unprotected resource violates; the expression
        // disagrees, so the definition must not be enforced.
        broken.test_cases = vec![InvariantTestCase {
            input: serde_json::json!({ "resource": "state://elsewhere/k" }),
            expect_violation: true,
        }];
        let head = InvariantHead::new(vec![broken]);
        assert!(head.definitions().is_empty());

        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                "cap_1",
                "mutate_state",
                "state://frozen/k",
            ))
            .await;
        assert_eq!(vote.decision, StageDecision::Allow);
    }

    #[tokio::test]
    async fn invariant_head_default_definitions_pass_their_own_cases() {
        let head = InvariantHead::with_defaults();
        assert_eq!(head.definitions().len(), 3);
        assert!(head.definitions().iter().all(|d| !d.is_relaxable()));
        assert!(head.definitions().iter().all(|d| !d.signature.sig.is_empty()));
    }

    #[tokio::test]
    async fn invariant_head_blocks_protected_mutations() {
        let head = InvariantHead::with_defaults();
        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                "cap_1",
                "mutate_state",
                "ledger://blocks/3",
            ))
            .await;
        assert_eq!(vote.decision, StageDecision::Deny);
        assert!(code(&vote).starts_with("INVARIANT_VIOLATION:INV_LEDGER_APPEND_ONLY"));

        // Reads of protected state stay permitted.
        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                "cap_1",
                "read",
                "ledger://blocks/3",
            ))
            .await;
        assert_eq!(vote.decision, StageDecision::Allow);

        let vote = head
            .vote(&envelope(
                "did:cascade:test:alice",
                "cap_1",
                "mutate_state",
                "state://data/key1",
            ))
            .await;
        assert_eq!(vote.decision, StageDecision::Allow);
    }
}
