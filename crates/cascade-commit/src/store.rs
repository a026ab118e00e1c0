//! Versioned canonical key→value store with optimistic concurrency.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CommitError;

/// A canonical value with its monotonically increasing version.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: serde_json::Value,
    pub version: u64,
    /// Request that wrote this version.
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreState {
    current: HashMap<String, VersionedValue>,
    history: HashMap<String, Vec<VersionedValue>>,
}

/// The canonical key→value map, keyed by resource URI.
///
/// Writes to the same key are serialized by the store lock; an
/// `expected_version` precondition makes last-committer-wins safe by
/// re-checking before overwrite.
pub struct CanonicalStore {
    state: RwLock<StoreState>,
}

impl CanonicalStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Write a value. With `expected_version`, the write only succeeds if
    /// the key is currently at that version (0 means "must not exist").
    pub fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        modified_by: &str,
        expected_version: Option<u64>,
    ) -> Result<VersionedValue, CommitError> {
        let mut state = self.state.write().map_err(|_| CommitError::LockPoisoned)?;

        let current_version = state.current.get(key).map(|v| v.version).unwrap_or(0);
        if let Some(expected) = expected_version {
            if expected != current_version {
                return Err(CommitError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    current: current_version,
                });
            }
        }

        let next = VersionedValue {
            value,
            version: current_version + 1,
            modified_by: modified_by.to_string(),
            modified_at: Utc::now(),
        };
        state.current.insert(key.to_string(), next.clone());
        state
            .history
            .entry(key.to_string())
            .or_default()
            .push(next.clone());
        Ok(next)
    }

    /// Restore a key to a previous versioned value, or remove it entirely
    /// when `prior` is `None`. Used only by rollback.
    pub(crate) fn restore(
        &self,
        key: &str,
        prior: Option<VersionedValue>,
    ) -> Result<(), CommitError> {
        let mut state = self.state.write().map_err(|_| CommitError::LockPoisoned)?;
        match prior {
            Some(value) => {
                state.current.insert(key.to_string(), value);
            }
            None => {
                state.current.remove(key);
            }
        }
        if let Some(history) = state.history.get_mut(key) {
            history.pop();
            if history.is_empty() {
                state.history.remove(key);
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<VersionedValue> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.current.get(key).cloned())
    }

    pub fn version_of(&self, key: &str) -> u64 {
        self.get(key).map(|v| v.version).unwrap_or(0)
    }

    pub fn delete(&self, key: &str, expected_version: Option<u64>) -> Result<bool, CommitError> {
        let mut state = self.state.write().map_err(|_| CommitError::LockPoisoned)?;
        let current_version = match state.current.get(key) {
            Some(v) => v.version,
            None => return Ok(false),
        };
        if let Some(expected) = expected_version {
            if expected != current_version {
                return Err(CommitError::VersionConflict {
                    key: key.to_string(),
                    expected,
                    current: current_version,
                });
            }
        }
        state.current.remove(key);
        Ok(true)
    }

    /// Version history for a key, oldest first.
    pub fn history(&self, key: &str) -> Vec<VersionedValue> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.history.get(key).cloned())
            .unwrap_or_default()
    }

    /// Point-in-time copy of the whole map.
    pub fn snapshot(&self) -> HashMap<String, VersionedValue> {
        self.state
            .read()
            .map(|state| state.current.clone())
            .unwrap_or_default()
    }

    pub fn key_count(&self) -> usize {
        self.state.read().map(|state| state.current.len()).unwrap_or(0)
    }
}

impl Default for CanonicalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_and_get_with_versions() {
        let store = CanonicalStore::new();
        let v1 = store.put("state://k", json!("v1"), "req_1", None).unwrap();
        assert_eq!(v1.version, 1);
        store.put("state://k", json!("v2"), "req_2", None).unwrap();
        assert_eq!(store.version_of("state://k"), 2);
        assert_eq!(store.get("state://k").unwrap().value, json!("v2"));
    }

    #[test]
    fn occ_conflict_detected() {
        let store = CanonicalStore::new();
        store.put("k", json!(1), "r1", None).unwrap();
        store.put("k", json!(2), "r2", None).unwrap();
        let err = store.put("k", json!(3), "r3", Some(1)).unwrap_err();
        assert!(matches!(
            err,
            CommitError::VersionConflict {
                expected: 1,
                current: 2,
                ..
            }
        ));
    }

    #[test]
    fn occ_success_at_expected_version() {
        let store = CanonicalStore::new();
        store.put("k", json!(1), "r1", None).unwrap();
        store.put("k", json!(2), "r2", Some(1)).unwrap();
        assert_eq!(store.get("k").unwrap().value, json!(2));
    }

    #[test]
    fn delete_honors_versions() {
        let store = CanonicalStore::new();
        assert!(!store.delete("missing", None).unwrap());
        store.put("k", json!(1), "r1", None).unwrap();
        store.put("k", json!(2), "r2", None).unwrap();
        assert!(store.delete("k", Some(2)).unwrap());
        assert!(store.get("k").is_none());
    }

    #[test]
    fn history_tracks_every_version() {
        let store = CanonicalStore::new();
        store.put("k", json!("a"), "r1", None).unwrap();
        store.put("k", json!("b"), "r2", None).unwrap();
        store.put("k", json!("c"), "r3", None).unwrap();
        let history = store.history("k");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].value, json!("a"));
        assert_eq!(history[2].value, json!("c"));
    }

    #[test]
    fn restore_rewinds_a_key() {
        let store = CanonicalStore::new();
        let v1 = store.put("k", json!("a"), "r1", None).unwrap();
        store.put("k", json!("b"), "r2", None).unwrap();
        store.restore("k", Some(v1)).unwrap();
        assert_eq!(store.get("k").unwrap().value, json!("a"));
        assert_eq!(store.version_of("k"), 1);
    }
}
