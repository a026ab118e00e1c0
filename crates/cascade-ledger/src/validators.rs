//! The validator set whose signature quorum seals blocks.

use cascade_crypto::{Ed25519Signer, RecordSigner};
use cascade_types::Signature;

/// A fixed set of block validators.
///
/// Sealing requires 2f+1 signatures to tolerate f faulty validators, with
/// f = ⌊(n−1)/3⌋ for an n-validator set. In this single-process reference
/// the validators are local keypairs standing in for the external
/// key-management service.
pub struct ValidatorSet {
    signers: Vec<Ed25519Signer>,
}

impl ValidatorSet {
    pub fn new(signers: Vec<Ed25519Signer>) -> Self {
        Self { signers }
    }

    /// Generate `n` local validators named `validator-0..n`.
    pub fn generate(n: usize) -> Self {
        Self {
            signers: (0..n)
                .map(|i| Ed25519Signer::generate(format!("validator-{i}")))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// Faults tolerated by this set size.
    pub fn fault_tolerance(&self) -> usize {
        self.signers.len().saturating_sub(1) / 3
    }

    /// Signatures required to seal: 2f+1.
    pub fn required_signatures(&self) -> usize {
        2 * self.fault_tolerance() + 1
    }

    /// Sign `message` with every available validator.
    pub fn sign_all(&self, message: &[u8]) -> Vec<Signature> {
        self.signers
            .iter()
            .map(|s| Signature::new("ed25519", s.kid(), s.sign(message)))
            .collect()
    }

    /// Countersign `message` with the set's primary validator. Individual
    /// records carry this single signature; the sealing quorum signs whole
    /// blocks.
    pub fn sign_primary(&self, message: &[u8]) -> Option<Signature> {
        self.signers
            .first()
            .map(|s| Signature::new("ed25519", s.kid(), s.sign(message)))
    }
}
