//! The request envelope - the unit of work submitted to the waterfall.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::TokenId;
use crate::identity::PrincipalId;
use crate::{Signature, TypesError};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("req_{}", uuid::Uuid::new_v4()))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the actor wants to do.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Intent {
    /// Action verb, e.g. "read", "mutate_state".
    pub action: String,
    /// Target resource URI, e.g. "state://data/key1".
    pub resource: String,
    /// Action parameters; for mutations, the commit stage reads the
    /// key/value pairs out of this object.
    pub parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// Ambient context that travels with the request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_hints: Vec<String>,
    /// Device attestation proof, checked by the identity head when enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_attestation: Option<String>,
    /// Deployment zone the request originates from, checked against
    /// zone-restricted capability scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestTimestamps {
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

/// The unit of work submitted to the pipeline. Immutable once created; the
/// content hash covers all fields except the signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: RequestId,
    pub actor: PrincipalId,
    pub subject: PrincipalId,
    pub capability_token_id: TokenId,
    pub intent: Intent,
    pub context: RequestContext,
    pub timestamps: RequestTimestamps,
    pub signature: Signature,
}

impl RequestEnvelope {
    /// Structural field presence check used by stage 0.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.request_id.0.is_empty() {
            return Err(TypesError::MissingField("request_id"));
        }
        if self.actor.0.is_empty() {
            return Err(TypesError::MissingField("actor"));
        }
        if self.subject.0.is_empty() {
            return Err(TypesError::MissingField("subject"));
        }
        if self.capability_token_id.0.is_empty() {
            return Err(TypesError::MissingField("capability_token_id"));
        }
        if self.intent.action.is_empty() {
            return Err(TypesError::MissingField("intent.action"));
        }
        if self.intent.resource.is_empty() {
            return Err(TypesError::MissingField("intent.resource"));
        }
        Ok(())
    }

    /// The envelope content without the signature, for hashing.
    pub fn signable_content(&self) -> serde_json::Value {
        serde_json::json!({
            "request_id": self.request_id,
            "actor": self.actor,
            "subject": self.subject,
            "capability_token_id": self.capability_token_id,
            "intent": self.intent,
            "context": self.context,
            "timestamps": self.timestamps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> RequestEnvelope {
        RequestEnvelope {
            request_id: RequestId::new("req_001"),
            actor: PrincipalId::new("did:cascade:test:alice"),
            subject: PrincipalId::new("did:cascade:test:alice"),
            capability_token_id: TokenId::new("cap_001"),
            intent: Intent {
                action: "mutate_state".into(),
                resource: "state://data/key1".into(),
                parameters: serde_json::json!({"value": 42}),
                justification: None,
            },
            context: RequestContext {
                trace_id: "trace_001".into(),
                ..Default::default()
            },
            timestamps: RequestTimestamps {
                created_at: Utc::now(),
                received_at: None,
            },
            signature: Signature::new("ed25519", "k1", "sig"),
        }
    }

    #[test]
    fn well_formed_envelope_validates() {
        assert!(envelope().validate().is_ok());
    }

    #[test]
    fn missing_fields_are_itemized() {
        let mut env = envelope();
        env.intent.action.clear();
        assert!(matches!(
            env.validate(),
            Err(TypesError::MissingField("intent.action"))
        ));
    }

    #[test]
    fn signable_content_excludes_signature() {
        let content = envelope().signable_content();
        assert!(content.get("signature").is_none());
        assert!(content.get("intent").is_some());
    }
}
