//! The sign/verify seam consumed by the ledger and record producers.
//!
//! Production deployments back this with an external key-management service;
//! the in-process Ed25519 implementation covers single-node use and tests.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signature is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("malformed signature bytes")]
    MalformedSignature,

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Narrow signing interface: message bytes in, hex signature out.
pub trait RecordSigner: Send + Sync {
    /// Key identifier to embed alongside produced signatures.
    fn kid(&self) -> &str;

    fn sign(&self, message: &[u8]) -> String;
}

/// Verification counterpart to [`RecordSigner`].
pub trait RecordVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature_hex: &str) -> Result<(), SignError>;
}

/// In-process Ed25519 keypair.
pub struct Ed25519Signer {
    kid: String,
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh keypair with the given key id.
    pub fn generate(kid: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Hex-encoded public key, suitable for an identity document entry.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }
}

impl RecordSigner for Ed25519Signer {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl RecordVerifier for Ed25519Signer {
    fn verify(&self, message: &[u8], signature_hex: &str) -> Result<(), SignError> {
        let bytes = hex::decode(signature_hex)?;
        let sig_bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| SignError::MalformedSignature)?;
        let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        self.signing_key
            .verifying_key()
            .verify(message, &signature)
            .map_err(|_| SignError::VerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrip() {
        let signer = Ed25519Signer::generate("validator-0");
        let sig = signer.sign(b"block content");
        assert!(signer.verify(b"block content", &sig).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer = Ed25519Signer::generate("validator-0");
        let sig = signer.sign(b"block content");
        assert!(matches!(
            signer.verify(b"other content", &sig),
            Err(SignError::VerificationFailed)
        ));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let signer = Ed25519Signer::generate("validator-0");
        assert!(signer.verify(b"m", "not-hex").is_err());
        assert!(signer.verify(b"m", "aabb").is_err());
    }
}
