//! Advisory analysis of the vote stream for head collusion and veto abuse.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use cascade_types::{HeadKind, RequestId, StageDecision};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Two heads agreeing suspiciously often.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollusionSignal {
    pub heads: (HeadKind, HeadKind),
    /// Fraction of shared requests where both cast the same decision.
    pub agreement: f64,
    pub shared_samples: usize,
}

/// One head denying far more than the population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VetoAbuseSignal {
    pub head: HeadKind,
    pub deny_rate: f64,
    pub baseline_deny_rate: f64,
    pub samples: usize,
}

struct Observation {
    request_id: RequestId,
    head: HeadKind,
    decision: StageDecision,
}

/// Sliding window over (request, head, decision) observations.
///
/// Signals are advisory: the analyzer never alters a decision, it only
/// surfaces configurations worth an operator's attention.
pub struct ThreatModelAnalyzer {
    capacity: usize,
    min_samples: usize,
    collusion_agreement_threshold: f64,
    veto_rate_multiplier: f64,
    window: Mutex<VecDeque<Observation>>,
}

impl ThreatModelAnalyzer {
    pub const DEFAULT_CAPACITY: usize = 1000;
    pub const DEFAULT_MIN_SAMPLES: usize = 10;
    pub const DEFAULT_COLLUSION_AGREEMENT: f64 = 0.95;
    pub const DEFAULT_VETO_MULTIPLIER: f64 = 2.0;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            min_samples: Self::DEFAULT_MIN_SAMPLES,
            collusion_agreement_threshold: Self::DEFAULT_COLLUSION_AGREEMENT,
            veto_rate_multiplier: Self::DEFAULT_VETO_MULTIPLIER,
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, request_id: RequestId, head: HeadKind, decision: StageDecision) {
        if let Ok(mut window) = self.window.lock() {
            if window.len() == self.capacity {
                window.pop_front();
            }
            window.push_back(Observation {
                request_id,
                head,
                decision,
            });
        }
    }

    pub fn observation_count(&self) -> usize {
        self.window.lock().map(|w| w.len()).unwrap_or(0)
    }

    /// Head pairs whose agreement rate exceeds the collusion threshold.
    pub fn collusion_signals(&self) -> Vec<CollusionSignal> {
        let window = match self.window.lock() {
            Ok(window) => window,
            Err(_) => return Vec::new(),
        };

        // request -> head -> decision
        let mut by_request: HashMap<&RequestId, HashMap<HeadKind, StageDecision>> = HashMap::new();
        for obs in window.iter() {
            by_request
                .entry(&obs.request_id)
                .or_default()
                .insert(obs.head, obs.decision);
        }

        const HEADS: [HeadKind; 3] = [HeadKind::Identity, HeadKind::Capability, HeadKind::Invariant];
        let mut signals = Vec::new();
        for (i, &a) in HEADS.iter().enumerate() {
            for &b in &HEADS[i + 1..] {
                let mut shared = 0usize;
                let mut agreed = 0usize;
                for votes in by_request.values() {
                    if let (Some(da), Some(db)) = (votes.get(&a), votes.get(&b)) {
                        shared += 1;
                        if da == db {
                            agreed += 1;
                        }
                    }
                }
                if shared < self.min_samples {
                    continue;
                }
                let agreement = agreed as f64 / shared as f64;
                if agreement > self.collusion_agreement_threshold {
                    warn!(head_a = %a, head_b = %b, agreement, shared, "possible head collusion");
                    signals.push(CollusionSignal {
                        heads: (a, b),
                        agreement,
                        shared_samples: shared,
                    });
                }
            }
        }
        signals
    }

    /// Heads whose deny rate exceeds the population baseline by the
    /// configured multiplier.
    pub fn veto_abuse_signals(&self) -> Vec<VetoAbuseSignal> {
        let window = match self.window.lock() {
            Ok(window) => window,
            Err(_) => return Vec::new(),
        };
        if window.is_empty() {
            return Vec::new();
        }

        let total = window.len();
        let total_denies = window
            .iter()
            .filter(|o| o.decision == StageDecision::Deny)
            .count();
        let baseline = total_denies as f64 / total as f64;
        if baseline == 0.0 {
            return Vec::new();
        }

        let mut per_head: HashMap<HeadKind, (usize, usize)> = HashMap::new();
        for obs in window.iter() {
            let entry = per_head.entry(obs.head).or_insert((0, 0));
            entry.0 += 1;
            if obs.decision == StageDecision::Deny {
                entry.1 += 1;
            }
        }

        let mut signals = Vec::new();
        for (head, (samples, denies)) in per_head {
            if samples < self.min_samples {
                continue;
            }
            let rate = denies as f64 / samples as f64;
            if rate > baseline * self.veto_rate_multiplier {
                warn!(%head, deny_rate = rate, baseline, "possible veto abuse");
                signals.push(VetoAbuseSignal {
                    head,
                    deny_rate: rate,
                    baseline_deny_rate: baseline,
                    samples,
                });
            }
        }
        signals
    }
}

impl Default for ThreatModelAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(i: usize) -> RequestId {
        RequestId::new(format!("req_{i}"))
    }

    #[test]
    fn window_is_bounded() {
        let analyzer = ThreatModelAnalyzer::with_capacity(5);
        for i in 0..10 {
            analyzer.record(req(i), HeadKind::Identity, StageDecision::Allow);
        }
        assert_eq!(analyzer.observation_count(), 5);
    }

    #[test]
    fn perfect_agreement_is_flagged_after_enough_samples() {
        let analyzer = ThreatModelAnalyzer::new();
        for i in 0..9 {
            analyzer.record(req(i), HeadKind::Identity, StageDecision::Allow);
            analyzer.record(req(i), HeadKind::Capability, StageDecision::Allow);
        }
        // Nine shared samples: below the floor, no signal yet.
        assert!(analyzer.collusion_signals().is_empty());

        analyzer.record(req(9), HeadKind::Identity, StageDecision::Deny);
        analyzer.record(req(9), HeadKind::Capability, StageDecision::Deny);
        let signals = analyzer.collusion_signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].heads, (HeadKind::Identity, HeadKind::Capability));
        assert_eq!(signals[0].agreement, 1.0);
        assert_eq!(signals[0].shared_samples, 10);
    }

    #[test]
    fn disagreement_produces_no_collusion_signal() {
        let analyzer = ThreatModelAnalyzer::new();
        for i in 0..20 {
            analyzer.record(req(i), HeadKind::Identity, StageDecision::Allow);
            let other = if i % 2 == 0 {
                StageDecision::Allow
            } else {
                StageDecision::Deny
            };
            analyzer.record(req(i), HeadKind::Capability, other);
        }
        assert!(analyzer.collusion_signals().is_empty());
    }

    #[test]
    fn outlier_deny_rate_is_flagged() {
        let analyzer = ThreatModelAnalyzer::new();
        // Identity denies everything; the other two heads almost never deny.
        for i in 0..20 {
            analyzer.record(req(i), HeadKind::Identity, StageDecision::Deny);
            analyzer.record(req(i), HeadKind::Capability, StageDecision::Allow);
            analyzer.record(req(i), HeadKind::Invariant, StageDecision::Allow);
        }
        let signals = analyzer.veto_abuse_signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].head, HeadKind::Identity);
        assert_eq!(signals[0].deny_rate, 1.0);
        assert!(signals[0].deny_rate > signals[0].baseline_deny_rate * 2.0);
    }

    #[test]
    fn uniform_deny_rates_are_unflagged() {
        let analyzer = ThreatModelAnalyzer::new();
        for i in 0..30 {
            let d = if i % 3 == 0 {
                StageDecision::Deny
            } else {
                StageDecision::Allow
            };
            analyzer.record(req(i), HeadKind::Identity, d);
            analyzer.record(req(i), HeadKind::Capability, d);
            analyzer.record(req(i), HeadKind::Invariant, d);
        }
        assert!(analyzer.veto_abuse_signals().is_empty());
    }
}
