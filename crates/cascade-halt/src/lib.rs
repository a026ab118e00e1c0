//! Cascade Halt - the SAFE-HALT emergency stop.
//!
//! A monotonic safety latch: once tripped, every write-path check fails
//! immediately until an explicit, attributed manual reset. Reads stay
//! permitted for forensics. The latch check is the first gate on every
//! write attempt, ahead of any stage logic, so stage ordering can never
//! bypass it.

#![deny(unsafe_code)]

use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

/// Why the latch tripped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    InvariantViolation,
    UnrecoverableError,
    AdministrativeAction,
    SecurityIncident,
    ChainCorruption,
    KeyCompromise,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HaltReason::InvariantViolation => "invariant_violation",
            HaltReason::UnrecoverableError => "unrecoverable_error",
            HaltReason::AdministrativeAction => "administrative_action",
            HaltReason::SecurityIncident => "security_incident",
            HaltReason::ChainCorruption => "chain_corruption",
            HaltReason::KeyCompromise => "key_compromise",
        };
        write!(f, "{s}")
    }
}

/// Permanent record of one trip of the latch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HaltEvent {
    pub reason: HaltReason,
    pub details: String,
    pub triggered_by: String,
    pub tripped_at: DateTime<Utc>,
    /// In-flight writes aborted when the latch tripped.
    pub writes_aborted: u64,
    /// Set when an operator clears this trip; the event itself is never
    /// removed from history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum HaltError {
    #[error("SAFE-HALT engaged ({reason}): {details} (triggered by {triggered_by})")]
    Halted {
        reason: HaltReason,
        details: String,
        triggered_by: String,
    },

    #[error("SAFE-HALT is not engaged; nothing to reset")]
    NotHalted,

    #[error("halt state lock poisoned")]
    LockPoisoned,
}

/// Hook invoked on every trip, for external alerting (paging, gossip).
pub type HaltAlertHook = Box<dyn Fn(&HaltEvent) + Send + Sync>;

#[derive(Default)]
struct HaltState {
    active: Option<HaltEvent>,
    history: Vec<HaltEvent>,
}

/// The SAFE-HALT controller.
pub struct SafeHaltController {
    state: RwLock<HaltState>,
    alert_hook: Mutex<Option<HaltAlertHook>>,
}

impl SafeHaltController {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HaltState::default()),
            alert_hook: Mutex::new(None),
        }
    }

    /// Install the external alert callback.
    pub fn set_alert_hook(&self, hook: HaltAlertHook) {
        if let Ok(mut slot) = self.alert_hook.lock() {
            *slot = Some(hook);
        }
    }

    /// Trip the latch. Idempotent while already halted: a second trigger is
    /// recorded in history but the active trip keeps its original context.
    pub fn trigger(
        &self,
        reason: HaltReason,
        details: impl Into<String>,
        triggered_by: impl Into<String>,
        writes_aborted: u64,
    ) -> Result<(), HaltError> {
        let event = HaltEvent {
            reason,
            details: details.into(),
            triggered_by: triggered_by.into(),
            tripped_at: Utc::now(),
            writes_aborted,
            reset_by: None,
            reset_at: None,
        };

        {
            let mut state = self.state.write().map_err(|_| HaltError::LockPoisoned)?;
            error!(
                %reason,
                details = %event.details,
                triggered_by = %event.triggered_by,
                writes_aborted,
                "SAFE-HALT tripped"
            );
            if state.active.is_none() {
                state.active = Some(event.clone());
            }
            state.history.push(event.clone());
        }

        if let Ok(hook) = self.alert_hook.lock() {
            if let Some(hook) = hook.as_ref() {
                hook(&event);
            }
        }
        Ok(())
    }

    /// The write-path gate. Fails with the original trigger context while
    /// the latch is engaged.
    pub fn check(&self) -> Result<(), HaltError> {
        let state = self.state.read().map_err(|_| HaltError::LockPoisoned)?;
        match &state.active {
            Some(event) => Err(HaltError::Halted {
                reason: event.reason,
                details: event.details.clone(),
                triggered_by: event.triggered_by.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.state
            .read()
            .map(|state| state.active.is_some())
            // A poisoned latch fails safe: report halted.
            .unwrap_or(true)
    }

    /// Explicit, attributed reset. History survives.
    pub fn reset(&self, authorized_by: impl Into<String>) -> Result<(), HaltError> {
        let mut state = self.state.write().map_err(|_| HaltError::LockPoisoned)?;
        if state.active.take().is_none() {
            return Err(HaltError::NotHalted);
        }
        let authorized_by = authorized_by.into();
        let now = Utc::now();
        if let Some(last) = state.history.last_mut() {
            last.reset_by = Some(authorized_by.clone());
            last.reset_at = Some(now);
        }
        warn!(authorized_by = %authorized_by, "SAFE-HALT reset");
        Ok(())
    }

    /// Full trip history, including cleared trips.
    pub fn history(&self) -> Vec<HaltEvent> {
        self.state
            .read()
            .map(|state| state.history.clone())
            .unwrap_or_default()
    }

    pub fn trip_count(&self) -> usize {
        self.state.read().map(|state| state.history.len()).unwrap_or(0)
    }
}

impl Default for SafeHaltController {
    fn default() -> Self {
        info!("SAFE-HALT controller armed");
        Self::new()
    }
}
