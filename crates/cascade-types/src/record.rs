//! Execution records and ledger blocks - the durable audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::TokenId;
use crate::decision::StageDecision;
use crate::identity::PrincipalId;
use crate::request::RequestId;
use crate::Signature;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("rec_{}", uuid::Uuid::new_v4()))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle timestamps for one pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordTimestamps {
    pub received_at: DateTime<Utc>,
    pub decided_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
}

/// One ledger entry per completed decision. The content hash covers all
/// fields except the validator signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub record_id: RecordId,
    pub request_id: RequestId,
    pub actor: PrincipalId,
    pub capability_token_id: TokenId,
    /// Hash of the combined pipeline inputs.
    pub inputs_hash: String,
    /// Hash of the shadow report, empty if the stage never ran.
    pub shadow_report_hash: String,
    /// Hash of the Cerberus decision.
    pub decision_hash: String,
    /// Hash of the applied canonical diff, empty when nothing committed.
    pub diff_hash: String,
    pub final_result: StageDecision,
    pub lifecycle: RecordTimestamps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator_signature: Option<Signature>,
}

impl ExecutionRecord {
    /// The record content without the validator signature, for hashing.
    pub fn signable_content(&self) -> serde_json::Value {
        serde_json::json!({
            "record_id": self.record_id,
            "request_id": self.request_id,
            "actor": self.actor,
            "capability_token_id": self.capability_token_id,
            "inputs_hash": self.inputs_hash,
            "shadow_report_hash": self.shadow_report_hash,
            "decision_hash": self.decision_hash,
            "diff_hash": self.diff_hash,
            "final_result": self.final_result,
            "lifecycle": self.lifecycle,
        })
    }
}

/// Trusted-time proof attached to each sealed block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeProof {
    pub timestamp: DateTime<Utc>,
    /// Identity of the time authority that vouches for the timestamp.
    pub authority: String,
    pub proof_hash: String,
}

/// A sealed batch of execution records, chained to its predecessor.
///
/// Blocks are append-only and never mutated after sealing; sealing requires
/// signatures from at least 2f+1 validators to tolerate f faulty ones.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerBlock {
    /// Monotonic from 0.
    pub height: u64,
    pub previous_block_hash: String,
    /// Merkle root over the ordered record hashes.
    pub merkle_root: String,
    pub record_hashes: Vec<String>,
    pub time_proof: TimeProof,
    pub validator_signatures: Vec<Signature>,
    pub sealed_at: DateTime<Utc>,
    /// External anchor hash, set when the block is cross-anchored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_hash: Option<String>,
}

impl LedgerBlock {
    pub fn record_count(&self) -> usize {
        self.record_hashes.len()
    }

    /// The block content bound by the validator signatures.
    pub fn signable_content(&self) -> serde_json::Value {
        serde_json::json!({
            "height": self.height,
            "previous_block_hash": self.previous_block_hash,
            "merkle_root": self.merkle_root,
            "record_hashes": self.record_hashes,
            "time_proof": self.time_proof,
        })
    }
}
