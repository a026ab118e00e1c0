//! Capability tokens - scoped, time-boxed, non-transitive grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::PrincipalId;
use crate::{Signature, TypesError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("cap_{}", uuid::Uuid::new_v4()))
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional per-scope constraints narrowing when a scope applies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScopeConstraints {
    /// Requests per minute allowed under this scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rate_per_minute: Option<u32>,
    /// Inclusive UTC window outside which the scope is inert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Deployment zone the scope is restricted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// One grant: a resource pattern and the actions allowed on it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityScope {
    /// Resource URI pattern; a trailing `*` matches any suffix.
    pub resource: String,
    pub actions: Vec<String>,
    #[serde(default)]
    pub constraints: ScopeConstraints,
}

impl CapabilityScope {
    /// Whether this scope covers `action` on `resource` at `now` from
    /// `zone`. A zone-restricted scope is inert outside its zone.
    pub fn covers(
        &self,
        action: &str,
        resource: &str,
        now: DateTime<Utc>,
        zone: Option<&str>,
    ) -> bool {
        if !self.actions.iter().any(|a| a == action) {
            return false;
        }
        if let Some(from) = self.constraints.valid_from {
            if now < from {
                return false;
            }
        }
        if let Some(until) = self.constraints.valid_until {
            if now > until {
                return false;
            }
        }
        if let Some(required) = &self.constraints.zone {
            if zone != Some(required.as_str()) {
                return false;
            }
        }
        resource_pattern_matches(&self.resource, resource)
    }
}

/// Glob-lite resource matching: exact match, or prefix match on `prefix*`.
pub fn resource_pattern_matches(pattern: &str, resource: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => resource.starts_with(prefix),
        None => pattern == resource,
    }
}

/// Non-delegable by default; delegation must be explicitly enabled.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegationPolicy {
    pub delegable: bool,
    pub max_depth: u8,
}

impl Default for DelegationPolicy {
    fn default() -> Self {
        Self {
            delegable: false,
            max_depth: 0,
        }
    }
}

/// Binding of the token to a client identity proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenBinding {
    /// e.g. "sha256:<client certificate fingerprint>"
    pub client_proof: String,
}

/// A scoped, time-limited, signed grant of specific actions on specific
/// resources to a specific subject.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub token_id: TokenId,
    pub issuer: PrincipalId,
    pub subject: PrincipalId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Single-use replay nonce; the structural stage records each one it sees.
    pub nonce: String,
    pub scopes: Vec<CapabilityScope>,
    #[serde(default)]
    pub delegation: DelegationPolicy,
    pub binding: TokenBinding,
    pub signature: Signature,
}

impl CapabilityToken {
    /// Validate construction-time invariants: expiry after issuance, at
    /// least one scope.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.expires_at <= self.issued_at {
            return Err(TypesError::ExpiryBeforeIssuance {
                issued_at: self.issued_at,
                expires_at: self.expires_at,
            });
        }
        if self.scopes.is_empty() {
            return Err(TypesError::EmptyScopes);
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether any scope covers the action/resource pair.
    pub fn covers(
        &self,
        action: &str,
        resource: &str,
        now: DateTime<Utc>,
        zone: Option<&str>,
    ) -> bool {
        self.scopes
            .iter()
            .any(|s| s.covers(action, resource, now, zone))
    }

    /// Scopes covering the pair, for constraint checks beyond coverage.
    pub fn covering_scopes(
        &self,
        action: &str,
        resource: &str,
        now: DateTime<Utc>,
        zone: Option<&str>,
    ) -> Vec<&CapabilityScope> {
        self.scopes
            .iter()
            .filter(|s| s.covers(action, resource, now, zone))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(issued: DateTime<Utc>, expires: DateTime<Utc>) -> CapabilityToken {
        CapabilityToken {
            token_id: TokenId::generate(),
            issuer: PrincipalId::new("did:cascade:ca"),
            subject: PrincipalId::new("did:cascade:test:alice"),
            issued_at: issued,
            expires_at: expires,
            nonce: "nonce_001".into(),
            scopes: vec![CapabilityScope {
                resource: "state://data/*".into(),
                actions: vec!["read".into(), "mutate_state".into()],
                constraints: ScopeConstraints::default(),
            }],
            delegation: DelegationPolicy::default(),
            binding: TokenBinding {
                client_proof: "sha256:aabb".into(),
            },
            signature: Signature::new("ed25519", "k1", "sig"),
        }
    }

    #[test]
    fn expiry_must_follow_issuance() {
        let now = Utc::now();
        assert!(token(now, now + Duration::hours(1)).validate().is_ok());
        assert!(token(now, now).validate().is_err());
        assert!(token(now, now - Duration::hours(1)).validate().is_err());
    }

    #[test]
    fn scope_covers_action_and_resource() {
        let t = token(Utc::now(), Utc::now() + Duration::hours(1));
        let now = Utc::now();
        assert!(t.covers("read", "state://data/key1", now, None));
        assert!(t.covers("mutate_state", "state://data/nested/key", now, None));
        assert!(!t.covers("delete", "state://data/key1", now, None));
        assert!(!t.covers("read", "state://other/key1", now, None));
    }

    #[test]
    fn zone_constraint_gates_scope() {
        let now = Utc::now();
        let mut t = token(now, now + Duration::hours(1));
        t.scopes[0].constraints.zone = Some("eu-west".into());
        assert!(t.covers("read", "state://data/key1", now, Some("eu-west")));
        assert!(!t.covers("read", "state://data/key1", now, Some("us-east")));
        assert!(!t.covers("read", "state://data/key1", now, None));
    }

    #[test]
    fn pattern_matching_is_prefix_glob() {
        assert!(resource_pattern_matches("state://data/*", "state://data/x"));
        assert!(resource_pattern_matches("state://data/x", "state://data/x"));
        assert!(!resource_pattern_matches("state://data/x", "state://data/y"));
        assert!(resource_pattern_matches("*", "anything"));
    }

    #[test]
    fn delegation_defaults_to_non_transitive() {
        let policy = DelegationPolicy::default();
        assert!(!policy.delegable);
        assert_eq!(policy.max_depth, 0);
    }

    #[test]
    fn time_window_constraint_gates_scope() {
        let now = Utc::now();
        let mut t = token(now - Duration::hours(2), now + Duration::hours(2));
        t.scopes[0].constraints.valid_until = Some(now - Duration::hours(1));
        assert!(!t.covers("read", "state://data/key1", now, None));
    }
}
