//! The durable ledger: append-only records, sealed blocks, verified chain.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use cascade_crypto::{hash_canonical, merkle_root};
use cascade_types::{ExecutionRecord, LedgerBlock, RecordId, TimeProof};
use chrono::Utc;
use tracing::{debug, info};

use crate::validators::ValidatorSet;
use crate::LedgerError;

/// Callback fired after each block seals.
pub type BlockSealedHook = Box<dyn Fn(&LedgerBlock) + Send + Sync>;

struct LedgerState {
    records: Vec<ExecutionRecord>,
    record_index: HashMap<RecordId, usize>,
    record_hashes: Vec<String>,
    /// Index of the first record not yet sealed into a block.
    sealed_upto: usize,
    blocks: Vec<LedgerBlock>,
    block_hashes: Vec<String>,
}

/// Append-only, hash-chained, Merkle-anchored decision ledger.
pub struct DurableLedger {
    block_size: usize,
    validators: ValidatorSet,
    state: RwLock<LedgerState>,
    on_sealed: Mutex<Option<BlockSealedHook>>,
}

impl DurableLedger {
    /// Previous-hash of block 0.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
    pub const DEFAULT_BLOCK_SIZE: usize = 64;

    pub fn new(block_size: usize, validators: ValidatorSet) -> Self {
        Self {
            block_size: block_size.max(1),
            validators,
            state: RwLock::new(LedgerState {
                records: Vec::new(),
                record_index: HashMap::new(),
                record_hashes: Vec::new(),
                sealed_upto: 0,
                blocks: Vec::new(),
                block_hashes: Vec::new(),
            }),
            on_sealed: Mutex::new(None),
        }
    }

    pub fn set_block_sealed_hook(&self, hook: BlockSealedHook) {
        if let Ok(mut slot) = self.on_sealed.lock() {
            *slot = Some(hook);
        }
    }

    /// Append one execution record; seals a block when enough records are
    /// pending. Returns the record's content hash.
    ///
    /// The primary validator countersigns the record's content hash, so the
    /// stored record attests who accepted it.
    pub fn append(&self, mut record: ExecutionRecord) -> Result<String, LedgerError> {
        let record_hash = hash_canonical(&record.signable_content())?;
        record.validator_signature = self.validators.sign_primary(record_hash.as_bytes());

        let sealed = {
            let mut state = self.state.write().map_err(|_| LedgerError::LockPoisoned)?;
            if state.record_index.contains_key(&record.record_id) {
                return Err(LedgerError::DuplicateRecord(record.record_id.0.clone()));
            }
            debug!(record = %record.record_id, hash = %record_hash, "record appended");
            let next_index = state.records.len();
            state
                .record_index
                .insert(record.record_id.clone(), next_index);
            state.records.push(record);
            state.record_hashes.push(record_hash.clone());

            if state.records.len() - state.sealed_upto >= self.block_size {
                Some(self.seal_locked(&mut state)?)
            } else {
                None
            }
        };

        if let Some(block) = sealed {
            self.fire_sealed_hook(&block);
        }
        Ok(record_hash)
    }

    /// Seal whatever is pending, regardless of block size. `None` when
    /// nothing is pending.
    pub fn force_seal(&self) -> Result<Option<LedgerBlock>, LedgerError> {
        let sealed = {
            let mut state = self.state.write().map_err(|_| LedgerError::LockPoisoned)?;
            if state.records.len() == state.sealed_upto {
                None
            } else {
                Some(self.seal_locked(&mut state)?)
            }
        };
        if let Some(block) = &sealed {
            self.fire_sealed_hook(block);
        }
        Ok(sealed)
    }

    fn seal_locked(&self, state: &mut LedgerState) -> Result<LedgerBlock, LedgerError> {
        let height = state.blocks.len() as u64;
        let record_hashes: Vec<String> = state.record_hashes[state.sealed_upto..].to_vec();
        let root = merkle_root(&record_hashes)?;
        let previous_block_hash = state
            .block_hashes
            .last()
            .cloned()
            .unwrap_or_else(|| Self::GENESIS_HASH.to_string());

        let now = Utc::now();
        let time_proof = TimeProof {
            timestamp: now,
            authority: "local-time-authority".to_string(),
            proof_hash: hash_canonical(&serde_json::json!({
                "height": height,
                "merkle_root": root,
                "timestamp": now,
            }))?,
        };

        let mut block = LedgerBlock {
            height,
            previous_block_hash,
            merkle_root: root,
            record_hashes,
            time_proof,
            validator_signatures: Vec::new(),
            sealed_at: now,
            anchor_hash: None,
        };

        let content = serde_json::to_vec(&block.signable_content())
            .map_err(cascade_crypto::HashError::from)?;
        block.validator_signatures = self.validators.sign_all(&content);
        let required = self.validators.required_signatures();
        if block.validator_signatures.len() < required {
            return Err(LedgerError::InsufficientSignatures {
                got: block.validator_signatures.len(),
                required,
            });
        }

        let block_hash = hash_canonical(&block.signable_content())?;
        info!(
            height,
            records = block.record_count(),
            merkle_root = %block.merkle_root,
            "ledger block sealed"
        );

        state.sealed_upto = state.records.len();
        state.blocks.push(block.clone());
        state.block_hashes.push(block_hash);
        Ok(block)
    }

    fn fire_sealed_hook(&self, block: &LedgerBlock) {
        if let Ok(hook) = self.on_sealed.lock() {
            if let Some(hook) = hook.as_ref() {
                hook(block);
            }
        }
    }

    /// Most recent records first, up to `limit`.
    pub fn get_records(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.state
            .read()
            .map(|state| state.records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_record(&self, record_id: &RecordId) -> Option<ExecutionRecord> {
        let state = self.state.read().ok()?;
        let index = *state.record_index.get(record_id)?;
        state.records.get(index).cloned()
    }

    pub fn get_block(&self, height: u64) -> Option<LedgerBlock> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.blocks.get(height as usize).cloned())
    }

    /// Attach an external anchor hash to a sealed block. The anchor sits
    /// outside the signed content, so sealing signatures stay valid.
    pub fn anchor_block(&self, height: u64, anchor_hash: impl Into<String>) -> bool {
        self.state
            .write()
            .map(|mut state| match state.blocks.get_mut(height as usize) {
                Some(block) => {
                    block.anchor_hash = Some(anchor_hash.into());
                    true
                }
                None => false,
            })
            .unwrap_or(false)
    }

    pub fn total_records(&self) -> usize {
        self.state.read().map(|state| state.records.len()).unwrap_or(0)
    }

    pub fn sealed_block_count(&self) -> usize {
        self.state.read().map(|state| state.blocks.len()).unwrap_or(0)
    }

    pub fn pending_record_count(&self) -> usize {
        self.state
            .read()
            .map(|state| state.records.len() - state.sealed_upto)
            .unwrap_or(0)
    }

    /// Re-derive every Merkle root and previous-hash link.
    ///
    /// Any tampering with a sealed block's records, root, or linkage makes
    /// this return false. Each block is verifiable from its own contents
    /// plus its predecessor's hash alone.
    pub fn verify_chain(&self) -> bool {
        let state = match self.state.read() {
            Ok(state) => state,
            Err(_) => return false,
        };

        let mut expected_prev = Self::GENESIS_HASH.to_string();
        for block in &state.blocks {
            if block.previous_block_hash != expected_prev {
                return false;
            }
            match merkle_root(&block.record_hashes) {
                Ok(root) if root == block.merkle_root => {}
                _ => return false,
            }
            if block.validator_signatures.len() < self.validators.required_signatures() {
                return false;
            }
            expected_prev = match hash_canonical(&block.signable_content()) {
                Ok(hash) => hash,
                Err(_) => return false,
            };
        }
        true
    }

    /// Test-only access used to simulate tampering.
    #[cfg(test)]
    fn corrupt_block<F: FnOnce(&mut LedgerBlock)>(&self, height: u64, f: F) {
        let mut state = self.state.write().unwrap();
        f(&mut state.blocks[height as usize]);
    }
}
