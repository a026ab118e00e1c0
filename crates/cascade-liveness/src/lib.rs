//! Cascade Liveness - no request waits forever.
//!
//! The head monitor bounds every head evaluation with a timeout and
//! substitutes a deny-safe vote when a head is too slow, so one stuck head
//! never blocks a decision. The deadlock detector watches in-flight requests
//! against per-stage and total pipeline budgets, and the worst-case decision
//! time is an explicit, testable arithmetic bound.

#![deny(unsafe_code)]

pub mod deadlock;
pub mod monitor;

pub use deadlock::{DeadlockDetector, DeadlockViolation, ViolationKind};
pub use monitor::{HeadHealth, HeadMonitor};

use std::time::Duration;

/// Upper bound on time-to-decision for one request.
///
/// queue wait + every stage at its full budget + one retry allowance.
pub fn worst_case_decision_time(
    queue_timeout: Duration,
    stage_count: u32,
    stage_timeout: Duration,
    retry_timeout: Duration,
) -> Duration {
    queue_timeout + stage_timeout * stage_count + retry_timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_is_additive() {
        let bound = worst_case_decision_time(
            Duration::from_secs(5),
            7,
            Duration::from_secs(10),
            Duration::from_secs(5),
        );
        assert_eq!(bound, Duration::from_secs(80));
    }
}
