//! In-flight request tracking against stage and pipeline time budgets.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use cascade_types::{RequestId, StageKind};
use tracing::warn;

/// Why a request was flagged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// Too long inside one stage.
    StageTimeout,
    /// Too long in the pipeline overall.
    PipelineTimeout,
}

#[derive(Clone, Debug)]
pub struct DeadlockViolation {
    pub request_id: RequestId,
    pub stage: StageKind,
    pub kind: ViolationKind,
    pub elapsed: Duration,
}

struct InFlight {
    stage: StageKind,
    entered_stage: Instant,
    entered_pipeline: Instant,
}

/// Watches every in-flight request's stage occupancy.
///
/// The detector only observes; the engine is responsible for cancelling a
/// flagged request with a deny-safe result and rolling back partial writes.
pub struct DeadlockDetector {
    stage_timeout: Duration,
    total_timeout: Duration,
    in_flight: RwLock<HashMap<RequestId, InFlight>>,
}

impl DeadlockDetector {
    pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new() -> Self {
        Self::with_timeouts(Self::DEFAULT_STAGE_TIMEOUT, Self::DEFAULT_TOTAL_TIMEOUT)
    }

    pub fn with_timeouts(stage_timeout: Duration, total_timeout: Duration) -> Self {
        Self {
            stage_timeout,
            total_timeout,
            in_flight: RwLock::new(HashMap::new()),
        }
    }

    /// A request entered the pipeline at stage 0.
    pub fn begin(&self, request_id: RequestId) {
        if let Ok(mut in_flight) = self.in_flight.write() {
            let now = Instant::now();
            in_flight.insert(
                request_id,
                InFlight {
                    stage: StageKind::Structural,
                    entered_stage: now,
                    entered_pipeline: now,
                },
            );
        }
    }

    /// A request advanced to `stage`; resets its per-stage clock.
    pub fn enter_stage(&self, request_id: &RequestId, stage: StageKind) {
        if let Ok(mut in_flight) = self.in_flight.write() {
            if let Some(entry) = in_flight.get_mut(request_id) {
                entry.stage = stage;
                entry.entered_stage = Instant::now();
            }
        }
    }

    /// A request left the pipeline, however it ended.
    pub fn complete(&self, request_id: &RequestId) {
        if let Ok(mut in_flight) = self.in_flight.write() {
            in_flight.remove(request_id);
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    pub fn total_timeout(&self) -> Duration {
        self.total_timeout
    }

    /// Requests currently over a stage or pipeline budget.
    pub fn violations(&self) -> Vec<DeadlockViolation> {
        let in_flight = match self.in_flight.read() {
            Ok(in_flight) => in_flight,
            Err(_) => return Vec::new(),
        };
        let now = Instant::now();
        let mut violations = Vec::new();
        for (request_id, entry) in in_flight.iter() {
            let total = now.duration_since(entry.entered_pipeline);
            let staged = now.duration_since(entry.entered_stage);
            if total > self.total_timeout {
                warn!(request = %request_id, stage = entry.stage.name(), elapsed_ms = total.as_millis() as u64,
                    "request exceeded the pipeline budget");
                violations.push(DeadlockViolation {
                    request_id: request_id.clone(),
                    stage: entry.stage,
                    kind: ViolationKind::PipelineTimeout,
                    elapsed: total,
                });
            } else if staged > self.stage_timeout {
                warn!(request = %request_id, stage = entry.stage.name(), elapsed_ms = staged.as_millis() as u64,
                    "request exceeded a stage budget");
                violations.push(DeadlockViolation {
                    request_id: request_id.clone(),
                    stage: entry.stage,
                    kind: ViolationKind::StageTimeout,
                    elapsed: staged,
                });
            }
        }
        violations
    }
}

impl Default for DeadlockDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_bookkeeping() {
        let detector = DeadlockDetector::new();
        let req = RequestId::new("req_1");
        detector.begin(req.clone());
        assert_eq!(detector.in_flight_count(), 1);
        detector.enter_stage(&req, StageKind::Shadow);
        detector.complete(&req);
        assert_eq!(detector.in_flight_count(), 0);
    }

    #[test]
    fn healthy_requests_produce_no_violations() {
        let detector = DeadlockDetector::new();
        detector.begin(RequestId::new("req_1"));
        assert!(detector.violations().is_empty());
    }

    #[test]
    fn zero_budget_flags_stage_timeout() {
        let detector =
            DeadlockDetector::with_timeouts(Duration::ZERO, Duration::from_secs(60));
        let req = RequestId::new("req_1");
        detector.begin(req.clone());
        detector.enter_stage(&req, StageKind::Gate);
        let violations = detector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::StageTimeout);
        assert_eq!(violations[0].stage, StageKind::Gate);
    }

    #[test]
    fn pipeline_budget_dominates_stage_budget() {
        let detector = DeadlockDetector::with_timeouts(Duration::ZERO, Duration::ZERO);
        detector.begin(RequestId::new("req_1"));
        let violations = detector.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::PipelineTimeout);
    }

    #[test]
    fn completed_request_is_never_flagged() {
        let detector = DeadlockDetector::with_timeouts(Duration::ZERO, Duration::ZERO);
        let req = RequestId::new("req_1");
        detector.begin(req.clone());
        detector.complete(&req);
        assert!(detector.violations().is_empty());
    }
}
