//! Bounded nonce cache for replay detection.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Remembers which token nonces have been seen, bounded in memory.
///
/// Eviction is FIFO at capacity. The structural stage independently rejects
/// requests outside the clock-skew window, which bounds how far back an
/// evicted nonce could usefully be replayed.
pub struct NonceCache {
    inner: Mutex<NonceState>,
    capacity: usize,
}

struct NonceState {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl NonceCache {
    pub const DEFAULT_CAPACITY: usize = 100_000;

    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(NonceState {
                seen: HashSet::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Record a nonce. Returns `true` if it was fresh, `false` on replay.
    pub fn record(&self, nonce: &str) -> bool {
        let mut state = match self.inner.lock() {
            Ok(state) => state,
            // A poisoned cache must fail safe: treat everything as replayed.
            Err(_) => return false,
        };

        if state.seen.contains(nonce) {
            return false;
        }

        if state.seen.len() >= self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.seen.remove(&evicted);
            }
        }
        state.seen.insert(nonce.to_string());
        state.order.push_back(nonce.to_string());
        true
    }

    pub fn contains(&self, nonce: &str) -> bool {
        self.inner
            .lock()
            .map(|state| state.seen.contains(nonce))
            .unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|state| state.seen.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NonceCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_is_fresh_second_is_replay() {
        let cache = NonceCache::default();
        assert!(cache.record("nonce_abc"));
        assert!(!cache.record("nonce_abc"));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = NonceCache::new(2);
        assert!(cache.record("n1"));
        assert!(cache.record("n2"));
        assert!(cache.record("n3"));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("n1"));
        assert!(cache.contains("n2"));
        assert!(cache.contains("n3"));
    }
}
