//! Known-threat fingerprints matched by the signature stage.

use std::collections::HashMap;
use std::sync::RwLock;

use cascade_types::capability::resource_pattern_matches;
use cascade_types::RequestEnvelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// How dangerous a matched fingerprint is.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// One known-bad pattern over actor, device, action, and resource.
///
/// Patterns use the same glob-lite matching as capability scopes: exact, or
/// prefix with a trailing `*`. The device pattern matches the request's
/// attestation proof; a bare `*` matches requests with no attestation too.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreatFingerprint {
    pub id: String,
    pub actor_pattern: String,
    #[serde(default = "wildcard_pattern")]
    pub device_pattern: String,
    pub action_pattern: String,
    pub resource_pattern: String,
    pub severity: ThreatSeverity,
    pub description: String,
    pub added_at: DateTime<Utc>,
}

fn wildcard_pattern() -> String {
    "*".into()
}

impl ThreatFingerprint {
    pub fn matches(&self, envelope: &RequestEnvelope) -> bool {
        let device = envelope.context.device_attestation.as_deref().unwrap_or("");
        resource_pattern_matches(&self.actor_pattern, &envelope.actor.0)
            && resource_pattern_matches(&self.device_pattern, device)
            && resource_pattern_matches(&self.action_pattern, &envelope.intent.action)
            && resource_pattern_matches(&self.resource_pattern, &envelope.intent.resource)
    }
}

/// In-memory fingerprint registry consulted on every request.
pub struct ThreatFingerprintStore {
    fingerprints: RwLock<HashMap<String, ThreatFingerprint>>,
}

impl ThreatFingerprintStore {
    pub fn new() -> Self {
        Self {
            fingerprints: RwLock::new(HashMap::new()),
        }
    }

    /// Register a fingerprint matching any device, returning its id.
    pub fn add(
        &self,
        actor_pattern: impl Into<String>,
        action_pattern: impl Into<String>,
        resource_pattern: impl Into<String>,
        severity: ThreatSeverity,
        description: impl Into<String>,
    ) -> String {
        self.add_with_device(
            actor_pattern,
            "*",
            action_pattern,
            resource_pattern,
            severity,
            description,
        )
    }

    /// Register a device-keyed fingerprint, returning its generated id.
    pub fn add_with_device(
        &self,
        actor_pattern: impl Into<String>,
        device_pattern: impl Into<String>,
        action_pattern: impl Into<String>,
        resource_pattern: impl Into<String>,
        severity: ThreatSeverity,
        description: impl Into<String>,
    ) -> String {
        let fingerprint = ThreatFingerprint {
            id: format!("fp_{}", uuid::Uuid::new_v4()),
            actor_pattern: actor_pattern.into(),
            device_pattern: device_pattern.into(),
            action_pattern: action_pattern.into(),
            resource_pattern: resource_pattern.into(),
            severity,
            description: description.into(),
            added_at: Utc::now(),
        };
        let id = fingerprint.id.clone();
        info!(fingerprint = %id, severity = ?severity, "threat fingerprint added");
        if let Ok(mut fingerprints) = self.fingerprints.write() {
            fingerprints.insert(id.clone(), fingerprint);
        }
        id
    }

    pub fn remove(&self, id: &str) -> bool {
        self.fingerprints
            .write()
            .map(|mut fingerprints| fingerprints.remove(id).is_some())
            .unwrap_or(false)
    }

    /// All fingerprints matching the envelope, unordered.
    pub fn matches(&self, envelope: &RequestEnvelope) -> Vec<ThreatFingerprint> {
        self.fingerprints
            .read()
            .map(|fingerprints| {
                fingerprints
                    .values()
                    .filter(|f| f.matches(envelope))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The worst severity among matching fingerprints.
    pub fn worst_match(&self, envelope: &RequestEnvelope) -> Option<ThreatFingerprint> {
        self.matches(envelope)
            .into_iter()
            .max_by_key(|f| f.severity)
    }

    pub fn len(&self) -> usize {
        self.fingerprints.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ThreatFingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}
