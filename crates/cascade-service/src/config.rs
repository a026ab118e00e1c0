//! Deployment configuration with serde-friendly defaults.

use cascade_quorum::QuorumPolicy;
use serde::{Deserialize, Serialize};

/// Everything tunable about a Cascade deployment.
///
/// Every field has a default matching the reference deployment, so partial
/// configuration files deserialize cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Principal id of the capability authority.
    pub authority_id: String,
    /// Future-dated requests beyond this skew are denied.
    pub max_clock_skew_seconds: i64,
    /// Bounded replay cache size.
    pub nonce_capacity: usize,

    /// Behavioral scoring.
    pub rate_limit_per_minute: f64,
    pub behavioral_quarantine_threshold: f64,
    pub behavioral_escalation_threshold: f64,

    /// Shadow divergence beyond this escalates.
    pub shadow_divergence_threshold: f64,

    /// Quorum policy over the three Cerberus heads.
    pub quorum_policy: QuorumPolicy,

    /// Liveness budgets.
    pub head_timeout_ms: u64,
    pub stage_timeout_secs: u64,
    pub total_timeout_secs: u64,

    /// Ledger sealing.
    pub block_size: usize,
    pub validator_count: usize,

    /// Threat analyzer window.
    pub analyzer_window: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            authority_id: "did:cascade:authority".into(),
            max_clock_skew_seconds: 300,
            nonce_capacity: 100_000,
            rate_limit_per_minute: 60.0,
            behavioral_quarantine_threshold: 0.85,
            behavioral_escalation_threshold: 0.5,
            shadow_divergence_threshold: 0.3,
            quorum_policy: QuorumPolicy::Unanimous,
            head_timeout_ms: 5_000,
            stage_timeout_secs: 10,
            total_timeout_secs: 60,
            block_size: 64,
            validator_count: 4,
            analyzer_window: 1_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CascadeConfig::default();
        assert_eq!(config.max_clock_skew_seconds, 300);
        assert_eq!(config.quorum_policy, QuorumPolicy::Unanimous);
        assert_eq!(config.validator_count, 4);
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: CascadeConfig =
            serde_json::from_str(r#"{"block_size": 8, "quorum_policy": {"k_of_n": 2}}"#).unwrap();
        assert_eq!(config.block_size, 8);
        assert_eq!(config.quorum_policy, QuorumPolicy::KOfN(2));
        assert_eq!(config.head_timeout_ms, 5_000);
    }
}
