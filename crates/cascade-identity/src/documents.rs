//! Identity document registry and device attestation.

use std::collections::HashMap;
use std::sync::RwLock;

use cascade_types::{IdentityDocument, PrincipalId, RevocationStatus};
use chrono::Utc;
use tracing::info;

use crate::IdentityError;

/// Registry of canonical identity documents, keyed by principal id.
///
/// A principal id registers exactly once; re-registration is a duplicate
/// error rather than an overwrite.
pub struct IdentityDocumentStore {
    documents: RwLock<HashMap<PrincipalId, IdentityDocument>>,
}

impl IdentityDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, document: IdentityDocument) -> Result<(), IdentityError> {
        document.validate()?;

        let mut documents = self
            .documents
            .write()
            .map_err(|_| IdentityError::LockPoisoned)?;
        if documents.contains_key(&document.id) {
            return Err(IdentityError::DuplicateDocument(document.id.0.clone()));
        }
        info!(principal = %document.id, "identity document registered");
        documents.insert(document.id.clone(), document);
        Ok(())
    }

    pub fn get(&self, id: &PrincipalId) -> Result<Option<IdentityDocument>, IdentityError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| IdentityError::LockPoisoned)?;
        Ok(documents.get(id).cloned())
    }

    /// Mark a document revoked. Revocation is permanent.
    pub fn revoke(&self, id: &PrincipalId, reason: &str) -> Result<(), IdentityError> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| IdentityError::LockPoisoned)?;
        let doc = documents
            .get_mut(id)
            .ok_or_else(|| IdentityError::DocumentNotFound(id.0.clone()))?;
        doc.revocation = RevocationStatus::revoked(reason, Utc::now());
        info!(principal = %id, reason, "identity revoked");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdentityDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Trusted device fingerprints per principal, consulted by the identity
/// head when device attestation is enforced.
pub struct DeviceAttestationRegistry {
    devices: RwLock<HashMap<PrincipalId, Vec<String>>>,
}

impl DeviceAttestationRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_device(
        &self,
        principal: PrincipalId,
        fingerprint: impl Into<String>,
    ) -> Result<(), IdentityError> {
        let mut devices = self
            .devices
            .write()
            .map_err(|_| IdentityError::LockPoisoned)?;
        devices.entry(principal).or_default().push(fingerprint.into());
        Ok(())
    }

    pub fn is_trusted(&self, principal: &PrincipalId, fingerprint: &str) -> bool {
        self.devices
            .read()
            .map(|d| {
                d.get(principal)
                    .map(|list| list.iter().any(|f| f == fingerprint))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

impl Default for DeviceAttestationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::{
        IdentityAttributes, PrincipalKind, PublicKeyEntry, RiskTier, Signature,
    };
    use chrono::Duration;

    fn doc(id: &str) -> IdentityDocument {
        IdentityDocument {
            id: PrincipalId::new(id),
            kind: PrincipalKind::Agent,
            public_keys: vec![PublicKeyEntry {
                kid: "k1".into(),
                kty: "ed25519".into(),
                pub_key: "aabb".into(),
                created: Utc::now(),
                expires: Utc::now() + Duration::days(365),
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

    #[test]
    fn register_and_fetch() {
        let store = IdentityDocumentStore::new();
        store.register(doc("did:cascade:test:alice")).unwrap();
        let fetched = store
            .get(&PrincipalId::new("did:cascade:test:alice"))
            .unwrap();
        assert!(fetched.is_some());
    }

    #[test]
    fn duplicate_registration_rejected() {
        let store = IdentityDocumentStore::new();
        store.register(doc("did:cascade:test:alice")).unwrap();
        assert!(matches!(
            store.register(doc("did:cascade:test:alice")),
            Err(IdentityError::DuplicateDocument(_))
        ));
    }

    #[test]
    fn revocation_is_visible() {
        let store = IdentityDocumentStore::new();
        store.register(doc("did:cascade:test:alice")).unwrap();
        store
            .revoke(&PrincipalId::new("did:cascade:test:alice"), "compromised")
            .unwrap();
        let fetched = store
            .get(&PrincipalId::new("did:cascade:test:alice"))
            .unwrap()
            .unwrap();
        assert!(fetched.is_revoked());
    }

    #[test]
    fn device_trust_is_per_principal() {
        let registry = DeviceAttestationRegistry::new();
        let alice = PrincipalId::new("did:cascade:test:alice");
        let bob = PrincipalId::new("did:cascade:test:bob");
        registry
            .register_device(alice.clone(), "sha256:trusted")
            .unwrap();
        assert!(registry.is_trusted(&alice, "sha256:trusted"));
        assert!(!registry.is_trusted(&alice, "sha256:other"));
        assert!(!registry.is_trusted(&bob, "sha256:trusted"));
    }
}
