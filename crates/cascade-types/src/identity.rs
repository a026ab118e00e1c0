//! Identity documents - who a principal is and which keys speak for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Signature, TypesError};

/// DID-style principal identifier, e.g. `did:cascade:ops:alice`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Minimal DID shape check: `did:<method>:<specific-id>`.
    pub fn is_valid_did(&self) -> bool {
        let mut parts = self.0.splitn(3, ':');
        matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some("did"), Some(method), Some(rest)) if !method.is_empty() && !rest.is_empty()
        )
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of principal a document describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Human,
    Service,
    Agent,
}

/// Risk tier assigned to a principal by its operator.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

/// One public key bound to a principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyEntry {
    /// Key identifier, referenced by signatures.
    pub kid: String,
    /// Key type, e.g. "ed25519".
    pub kty: String,
    /// Hex-encoded public key material.
    pub pub_key: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl PublicKeyEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// Operator-assigned attributes used by the identity head.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityAttributes {
    pub org: String,
    pub role: String,
    pub risk_tier: RiskTier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationState {
    Active,
    Revoked,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevocationStatus {
    pub state: RevocationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RevocationStatus {
    pub fn active() -> Self {
        Self {
            state: RevocationState::Active,
            revoked_at: None,
            reason: None,
        }
    }

    pub fn revoked(reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            state: RevocationState::Revoked,
            revoked_at: Some(at),
            reason: Some(reason.into()),
        }
    }
}

/// Canonical, signed record identifying a principal.
///
/// A revoked document can never authorize a new request, and a document with
/// no unexpired key is unusable even while active.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityDocument {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    pub public_keys: Vec<PublicKeyEntry>,
    pub attributes: IdentityAttributes,
    pub revocation: RevocationStatus,
    /// Self-describing signature over all other fields.
    pub signature: Signature,
}

impl IdentityDocument {
    /// Validate structural invariants that must hold at construction time.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.public_keys.is_empty() {
            return Err(TypesError::NoPublicKeys);
        }
        Ok(())
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation.state == RevocationState::Revoked
    }

    /// Whether at least one key is usable at `now`.
    pub fn has_valid_key(&self, now: DateTime<Utc>) -> bool {
        self.public_keys.iter().any(|k| !k.is_expired(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn doc(expires: DateTime<Utc>) -> IdentityDocument {
        IdentityDocument {
            id: PrincipalId::new("did:cascade:test:alice"),
            kind: PrincipalKind::Human,
            public_keys: vec![PublicKeyEntry {
                kid: "k1".into(),
                kty: "ed25519".into(),
                pub_key: "aabb".into(),
                created: Utc::now() - Duration::days(1),
                expires,
            }],
            attributes: IdentityAttributes {
                org: "test".into(),
                role: "admin".into(),
                risk_tier: RiskTier::Low,
            },
            revocation: RevocationStatus::active(),
            signature: Signature::new("ed25519", "k1", "sig"),
        }
    }

    #[test]
    fn did_format_check() {
        assert!(PrincipalId::new("did:cascade:alice").is_valid_did());
        assert!(!PrincipalId::new("cascade:alice").is_valid_did());
        assert!(!PrincipalId::new("did::").is_valid_did());
        assert!(!PrincipalId::new("bad_did").is_valid_did());
    }

    #[test]
    fn expired_keys_are_unusable() {
        let now = Utc::now();
        assert!(doc(now + Duration::days(30)).has_valid_key(now));
        assert!(!doc(now - Duration::days(1)).has_valid_key(now));
    }

    #[test]
    fn empty_key_set_rejected() {
        let mut d = doc(Utc::now() + Duration::days(1));
        d.public_keys.clear();
        assert!(matches!(d.validate(), Err(TypesError::NoPublicKeys)));
    }
}
