//! Cascade Service - the front door.
//!
//! [`CascadeService`] wires every store and stage of a deployment together
//! and exposes submission, ledger queries, capability issuance, SAFE-HALT
//! control, and threat-signal inspection.

#![deny(unsafe_code)]

pub mod config;
pub mod service;

pub use config::CascadeConfig;
pub use service::{CascadeService, Decision, ServiceError, StageSummary};

/// Install the global tracing subscriber, honoring `RUST_LOG`.
///
/// For binaries and integration tests; safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
