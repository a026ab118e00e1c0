//! Timeout-bounded head evaluation with health tracking.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

use cascade_types::{CerberusVote, HeadKind, Reason, RequestId, Signature, StageDecision};
use chrono::Utc;
use tracing::{info, warn};

/// Health of one head as seen by the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadHealth {
    Healthy,
    /// At least one recent timeout.
    Degraded,
    /// `failure_threshold` consecutive timeouts.
    Failed,
}

#[derive(Default)]
struct HeadStats {
    consecutive_timeouts: u32,
    total_timeouts: u64,
    total_calls: u64,
}

/// Bounds each head evaluation with a timeout and substitutes a deny-safe
/// vote when the head misses it. One success resets the consecutive-timeout
/// counter, so a FAILED head recovers on its next good answer.
pub struct HeadMonitor {
    timeout: Duration,
    failure_threshold: u32,
    stats: RwLock<HashMap<HeadKind, HeadStats>>,
}

impl HeadMonitor {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
            stats: RwLock::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one head evaluation under the timeout. On expiry the result is a
    /// deny vote attributed to the monitor, never a hang.
    pub async fn evaluate<F>(&self, request_id: RequestId, head: HeadKind, fut: F) -> CerberusVote
    where
        F: Future<Output = CerberusVote>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(vote) => {
                self.record_success(head);
                vote
            }
            Err(_) => {
                self.record_timeout(head);
                warn!(request = %request_id, %head, timeout_ms = self.timeout.as_millis() as u64,
                    "head timed out, substituting deny-safe vote");
                CerberusVote {
                    request_id,
                    head,
                    decision: StageDecision::Deny,
                    reasons: vec![Reason::new(
                        "HEAD_TIMEOUT",
                        format!("{head} head did not answer within {:?}", self.timeout),
                    )],
                    timestamp: Utc::now(),
                    signature: Signature::new("none", "liveness-monitor", ""),
                }
            }
        }
    }

    fn record_success(&self, head: HeadKind) {
        if let Ok(mut stats) = self.stats.write() {
            let entry = stats.entry(head).or_default();
            entry.total_calls += 1;
            if entry.consecutive_timeouts > 0 {
                info!(%head, "head recovered");
            }
            entry.consecutive_timeouts = 0;
        }
    }

    fn record_timeout(&self, head: HeadKind) {
        if let Ok(mut stats) = self.stats.write() {
            let entry = stats.entry(head).or_default();
            entry.total_calls += 1;
            entry.total_timeouts += 1;
            entry.consecutive_timeouts += 1;
        }
    }

    pub fn health(&self, head: HeadKind) -> HeadHealth {
        self.stats
            .read()
            .ok()
            .and_then(|stats| {
                stats.get(&head).map(|s| {
                    if s.consecutive_timeouts >= self.failure_threshold {
                        HeadHealth::Failed
                    } else if s.consecutive_timeouts > 0 {
                        HeadHealth::Degraded
                    } else {
                        HeadHealth::Healthy
                    }
                })
            })
            .unwrap_or(HeadHealth::Healthy)
    }

    pub fn timeout_count(&self, head: HeadKind) -> u64 {
        self.stats
            .read()
            .ok()
            .and_then(|stats| stats.get(&head).map(|s| s.total_timeouts))
            .unwrap_or(0)
    }
}

impl Default for HeadMonitor {
    fn default() -> Self {
        Self::new()
    }
}
