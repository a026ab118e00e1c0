//! Transactional commit of an approved request's mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{CanonicalStore, VersionedValue};
use crate::CommitError;

/// Terminal state of one commit attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed,
    RolledBack,
}

/// Write-ahead intent recorded before each key is touched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalEntry {
    pub request_id: String,
    pub key: String,
    pub prior_version: u64,
    pub new_version: u64,
    pub written_at: DateTime<Utc>,
}

/// Result of one commit attempt.
#[derive(Clone, Debug)]
pub struct CommitResult {
    pub outcome: CommitOutcome,
    pub keys_mutated: Vec<String>,
    /// Hex SHA-256 over the applied diff; empty when rolled back.
    pub diff_hash: String,
    pub versions_after: HashMap<String, u64>,
    pub rolled_back: bool,
    pub error: Option<String>,
}

/// Applies approved mutations to the canonical store.
///
/// Each key is recorded as a write-ahead intent, then written; if any key in
/// the batch fails its version precondition, every key already written is
/// restored in reverse order. A commit is all-or-nothing.
pub struct CommitCoordinator {
    store: Arc<CanonicalStore>,
    wal: Mutex<Vec<WalEntry>>,
}

impl CommitCoordinator {
    pub fn new(store: Arc<CanonicalStore>) -> Self {
        Self {
            store,
            wal: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<CanonicalStore> {
        &self.store
    }

    /// Apply `mutations` for `request_id`. `expected_versions` carries OCC
    /// preconditions per key; keys absent from it are written unchecked.
    pub fn commit(
        &self,
        request_id: &str,
        mutations: &[(String, serde_json::Value)],
        expected_versions: &HashMap<String, u64>,
    ) -> Result<CommitResult, CommitError> {
        let mut applied: Vec<(String, Option<VersionedValue>)> = Vec::new();
        let mut versions_after = HashMap::new();
        let mut diff_lines: Vec<serde_json::Value> = Vec::new();

        for (key, value) in mutations {
            let prior = self.store.get(key);
            let prior_version = prior.as_ref().map(|v| v.version).unwrap_or(0);
            let expected = expected_versions.get(key).copied();

            let written =
                match self
                    .store
                    .put(key, value.clone(), request_id, expected) {
                    Ok(v) => v,
                    Err(err) => {
                        // Precondition re-check failed mid-batch: undo in
                        // reverse order so no partial write survives.
                        warn!(request = request_id, key, %err, "commit failed, rolling back");
                        for (applied_key, prior_value) in applied.into_iter().rev() {
                            self.store.restore(&applied_key, prior_value)?;
                        }
                        return Ok(CommitResult {
                            outcome: CommitOutcome::RolledBack,
                            keys_mutated: Vec::new(),
                            diff_hash: String::new(),
                            versions_after: HashMap::new(),
                            rolled_back: true,
                            error: Some(err.to_string()),
                        });
                    }
                };

            self.record_wal(WalEntry {
                request_id: request_id.to_string(),
                key: key.clone(),
                prior_version,
                new_version: written.version,
                written_at: written.modified_at,
            })?;

            diff_lines.push(serde_json::json!({
                "key": key,
                "prior_version": prior_version,
                "new_version": written.version,
                "prior_value": prior.as_ref().map(|v| &v.value),
                "new_value": value,
            }));
            versions_after.insert(key.clone(), written.version);
            applied.push((key.clone(), prior));
        }

        let diff_hash = cascade_crypto::hash_canonical(&serde_json::json!({
            "request_id": request_id,
            "diff": diff_lines,
        }))?;

        debug!(
            request = request_id,
            keys = applied.len(),
            diff_hash = %diff_hash,
            "commit applied"
        );

        Ok(CommitResult {
            outcome: CommitOutcome::Committed,
            keys_mutated: applied.into_iter().map(|(k, _)| k).collect(),
            diff_hash,
            versions_after,
            rolled_back: false,
            error: None,
        })
    }

    fn record_wal(&self, entry: WalEntry) -> Result<(), CommitError> {
        self.wal
            .lock()
            .map_err(|_| CommitError::LockPoisoned)?
            .push(entry);
        Ok(())
    }

    pub fn wal_entries(&self) -> Vec<WalEntry> {
        self.wal.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coordinator() -> CommitCoordinator {
        CommitCoordinator::new(Arc::new(CanonicalStore::new()))
    }

    #[test]
    fn basic_commit_applies_and_hashes() {
        let coord = coordinator();
        let result = coord
            .commit("req_1", &[("state://k".into(), json!("v"))], &HashMap::new())
            .unwrap();
        assert_eq!(result.outcome, CommitOutcome::Committed);
        assert!(!result.rolled_back);
        assert_eq!(result.keys_mutated, vec!["state://k".to_string()]);
        assert_eq!(result.diff_hash.len(), 64);
        assert_eq!(coord.store().get("state://k").unwrap().value, json!("v"));
    }

    #[test]
    fn multi_key_commit_versions() {
        let coord = coordinator();
        let result = coord
            .commit(
                "req_2",
                &[
                    ("a".into(), json!(1)),
                    ("b".into(), json!(2)),
                    ("c".into(), json!(3)),
                ],
                &HashMap::new(),
            )
            .unwrap();
        assert_eq!(result.keys_mutated.len(), 3);
        assert_eq!(result.versions_after["a"], 1);
        assert_eq!(result.versions_after["c"], 1);
    }

    #[test]
    fn empty_mutation_set_commits() {
        let coord = coordinator();
        let result = coord.commit("req_3", &[], &HashMap::new()).unwrap();
        assert_eq!(result.outcome, CommitOutcome::Committed);
        assert!(result.keys_mutated.is_empty());
    }

    #[test]
    fn version_conflict_rolls_back_whole_batch() {
        let coord = coordinator();
        coord
            .commit("r1", &[("k".into(), json!("v1"))], &HashMap::new())
            .unwrap();

        // Second batch writes "a" then hits a conflict on "k".
        let mut expected = HashMap::new();
        expected.insert("k".to_string(), 0u64); // wrong: current is 1
        let result = coord
            .commit(
                "r2",
                &[("a".into(), json!("x")), ("k".into(), json!("v2"))],
                &expected,
            )
            .unwrap();

        assert_eq!(result.outcome, CommitOutcome::RolledBack);
        assert!(result.rolled_back);
        assert!(result.error.as_deref().unwrap().contains("conflict"));
        // "a" was applied then rolled back.
        assert!(coord.store().get("a").is_none());
        // "k" still holds the first value.
        assert_eq!(coord.store().get("k").unwrap().value, json!("v1"));
    }

    #[test]
    fn wal_entries_recorded_per_key() {
        let coord = coordinator();
        coord
            .commit(
                "r1",
                &[("a".into(), json!(1)), ("b".into(), json!(2))],
                &HashMap::new(),
            )
            .unwrap();
        let wal = coord.wal_entries();
        assert_eq!(wal.len(), 2);
        assert_eq!(wal[0].key, "a");
        assert_eq!(wal[1].key, "b");
    }

    #[test]
    fn diff_hash_is_deterministic() {
        let c1 = coordinator();
        let c2 = coordinator();
        let r1 = c1
            .commit("r1", &[("k".into(), json!("v"))], &HashMap::new())
            .unwrap();
        let r2 = c2
            .commit("r1", &[("k".into(), json!("v"))], &HashMap::new())
            .unwrap();
        assert_eq!(r1.diff_hash, r2.diff_hash);
    }
}
