//! Per-subject behavioral baselines and deviation scoring.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use cascade_types::PrincipalId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Scoring weights and thresholds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Requests per minute considered normal.
    pub rate_limit_per_minute: f64,
    /// Trailing window for rate measurement, seconds.
    pub window_seconds: i64,
    pub quarantine_threshold: f64,
    pub escalation_threshold: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 60.0,
            window_seconds: 60,
            quarantine_threshold: 0.85,
            escalation_threshold: 0.5,
        }
    }
}

/// Component scores for one request against its subject's baseline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DeviationScore {
    pub rate_anomaly: f64,
    pub resource_novelty: f64,
    pub action_novelty: f64,
    /// 0.5·rate + 0.3·resource + 0.2·action, clamped to [0, 1].
    pub composite: f64,
}

#[derive(Default)]
struct SubjectBaseline {
    timestamps: VecDeque<DateTime<Utc>>,
    action_counts: HashMap<String, u64>,
    resource_counts: HashMap<String, u64>,
    total_requests: u64,
}

/// Rolling per-subject behavioral history.
///
/// Scoring is read-only; `observe` updates the baseline and is called after
/// every scored request, denied or not, so the baseline tracks what the
/// subject actually attempts.
pub struct BaselineStore {
    config: BaselineConfig,
    baselines: RwLock<HashMap<PrincipalId, SubjectBaseline>>,
}

impl BaselineStore {
    pub fn new(config: BaselineConfig) -> Self {
        Self {
            config,
            baselines: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BaselineConfig {
        &self.config
    }

    /// Deviation of (action, resource) at `now` from the subject's baseline.
    ///
    /// A subject with no history scores zero: there is nothing yet to
    /// deviate from.
    pub fn score(
        &self,
        subject: &PrincipalId,
        action: &str,
        resource: &str,
        now: DateTime<Utc>,
    ) -> DeviationScore {
        let baselines = match self.baselines.read() {
            Ok(baselines) => baselines,
            Err(_) => return self.zero_score(),
        };
        let baseline = match baselines.get(subject) {
            Some(baseline) if baseline.total_requests > 0 => baseline,
            _ => return self.zero_score(),
        };

        let window_start = now - Duration::seconds(self.config.window_seconds);
        let in_window = baseline
            .timestamps
            .iter()
            .filter(|t| **t >= window_start)
            .count() as f64;
        // Counting this request itself.
        let rate_per_minute =
            (in_window + 1.0) * 60.0 / self.config.window_seconds as f64;
        let limit = self.config.rate_limit_per_minute;
        // Strictly increasing in the rate beyond the limit, asymptotic to 1.
        let rate_anomaly = if rate_per_minute <= limit {
            0.0
        } else {
            let excess = rate_per_minute - limit;
            excess / (excess + limit)
        };

        let resource_novelty = novelty(baseline.resource_counts.get(resource).copied());
        let action_novelty = novelty(baseline.action_counts.get(action).copied());

        let composite = (0.5 * rate_anomaly + 0.3 * resource_novelty + 0.2 * action_novelty)
            .clamp(0.0, 1.0);
        DeviationScore {
            rate_anomaly,
            resource_novelty,
            action_novelty,
            composite,
        }
    }

    fn zero_score(&self) -> DeviationScore {
        DeviationScore {
            rate_anomaly: 0.0,
            resource_novelty: 0.0,
            action_novelty: 0.0,
            composite: 0.0,
        }
    }

    /// Fold one observed request into the subject's baseline.
    pub fn observe(
        &self,
        subject: &PrincipalId,
        action: &str,
        resource: &str,
        now: DateTime<Utc>,
    ) {
        if let Ok(mut baselines) = self.baselines.write() {
            let baseline = baselines.entry(subject.clone()).or_default();
            baseline.timestamps.push_back(now);
            let horizon = now - Duration::seconds(self.config.window_seconds * 10);
            while baseline
                .timestamps
                .front()
                .map(|t| *t < horizon)
                .unwrap_or(false)
            {
                baseline.timestamps.pop_front();
            }
            *baseline.action_counts.entry(action.to_string()).or_insert(0) += 1;
            *baseline
                .resource_counts
                .entry(resource.to_string())
                .or_insert(0) += 1;
            baseline.total_requests += 1;
        }
    }

    pub fn request_count(&self, subject: &PrincipalId) -> u64 {
        self.baselines
            .read()
            .map(|b| b.get(subject).map(|s| s.total_requests).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Discard a subject's accumulated history, e.g. after an authorized
    /// role change invalidates it. False when there was none.
    pub fn reset(&self, subject: &PrincipalId) -> bool {
        self.baselines
            .write()
            .map(|mut b| b.remove(subject).is_some())
            .unwrap_or(false)
    }

    pub fn subject_count(&self) -> usize {
        self.baselines.read().map(|b| b.len()).unwrap_or(0)
    }
}

fn novelty(count: Option<u64>) -> f64 {
    match count {
        None | Some(0) => 1.0,
        Some(n) => 1.0 / (1.0 + n as f64),
    }
}
