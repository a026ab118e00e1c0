//! The Cascade facade: construction, submission, and administration.

use std::sync::Arc;
use std::time::Duration;

use cascade_commit::{CanonicalStore, CommitCoordinator, VersionedValue};
use cascade_halt::{HaltError, HaltEvent, HaltReason, SafeHaltController};
use cascade_identity::{
    CapabilityAuthority, IdentityDocumentStore, IdentityError, NonceCache,
};
use cascade_ledger::{DurableLedger, LedgerError, ValidatorSet};
use cascade_liveness::{DeadlockDetector, DeadlockViolation, HeadMonitor};
use cascade_pipeline::stages::{
    BehavioralStage, CommitStage, GateStage, MemoryStage, ShadowStage, SignatureStage,
    StructuralStage,
};
use cascade_pipeline::{
    BaselineConfig, BaselineStore, DeviationScore, PassthroughSimulator, PipelineError,
    ShadowSimulator, ThreatFingerprintStore, ThreatSeverity, WaterfallEngine, WaterfallStage,
};
use cascade_quorum::{
    CapabilityHead, CerberusHead, CollusionSignal, IdentityHead, InvariantHead, QuorumEngine,
    ResilienceProfile, ThreatModelAnalyzer, VetoAbuseSignal,
};
use cascade_types::{
    CapabilityScope, CapabilityToken, DelegationPolicy, ExecutionRecord, IdentityDocument,
    LedgerBlock, PrincipalId, Reason, RequestEnvelope, RequestId, Severity, StageDecision,
    StageKind, TokenBinding, TokenId,
};
use chrono::Duration as ChronoDuration;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::CascadeConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("identity operation failed: {0}")]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Halt(#[from] HaltError),

    #[error("ledger operation failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// One stage's contribution to a decision, trimmed for the response.
#[derive(Clone, Debug, Serialize)]
pub struct StageSummary {
    pub stage: StageKind,
    pub decision: StageDecision,
    pub reasons: Vec<Reason>,
}

/// What the caller gets back for a submitted request.
#[derive(Clone, Debug, Serialize)]
pub struct Decision {
    pub request_id: RequestId,
    pub final_decision: StageDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<StageKind>,
    pub stages: Vec<StageSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.final_decision == StageDecision::Allow
    }

    /// Every reason any stage recorded, in stage order.
    pub fn reasons(&self) -> Vec<&Reason> {
        self.stages.iter().flat_map(|s| s.reasons.iter()).collect()
    }
}

/// Owns every store and stage of one Cascade deployment.
///
/// Everything is constructed here and dependency-injected downward; there
/// are no global singletons, so tests can run many isolated instances.
pub struct CascadeService {
    config: CascadeConfig,
    halt: Arc<SafeHaltController>,
    documents: Arc<IdentityDocumentStore>,
    authority: Arc<CapabilityAuthority>,
    fingerprints: Arc<ThreatFingerprintStore>,
    baselines: Arc<BaselineStore>,
    store: Arc<CanonicalStore>,
    ledger: Arc<DurableLedger>,
    analyzer: Arc<ThreatModelAnalyzer>,
    monitor: Arc<HeadMonitor>,
    engine: WaterfallEngine,
}

impl CascadeService {
    pub fn new(config: CascadeConfig) -> Self {
        Self::with_simulator(config, Arc::new(PassthroughSimulator))
    }

    /// Construct with a domain shadow simulator in place of the default
    /// passthrough.
    pub fn with_simulator(config: CascadeConfig, simulator: Arc<dyn ShadowSimulator>) -> Self {
        let halt = Arc::new(SafeHaltController::new());
        let documents = Arc::new(IdentityDocumentStore::new());
        let authority = Arc::new(CapabilityAuthority::new(PrincipalId::new(
            config.authority_id.clone(),
        )));
        let nonces = Arc::new(NonceCache::new(config.nonce_capacity));
        let fingerprints = Arc::new(ThreatFingerprintStore::new());
        let baselines = Arc::new(BaselineStore::new(BaselineConfig {
            rate_limit_per_minute: config.rate_limit_per_minute,
            window_seconds: 60,
            quarantine_threshold: config.behavioral_quarantine_threshold,
            escalation_threshold: config.behavioral_escalation_threshold,
        }));
        let store = Arc::new(CanonicalStore::new());
        let coordinator = Arc::new(CommitCoordinator::new(store.clone()));
        let ledger = Arc::new(DurableLedger::new(
            config.block_size,
            ValidatorSet::generate(config.validator_count),
        ));
        let analyzer = Arc::new(ThreatModelAnalyzer::with_capacity(config.analyzer_window));
        let monitor = Arc::new(HeadMonitor::with_timeout(Duration::from_millis(
            config.head_timeout_ms,
        )));
        let deadlock = Arc::new(DeadlockDetector::with_timeouts(
            Duration::from_secs(config.stage_timeout_secs),
            Duration::from_secs(config.total_timeout_secs),
        ));

        let heads: Vec<Arc<dyn CerberusHead>> = vec![
            Arc::new(IdentityHead::new(documents.clone())),
            Arc::new(CapabilityHead::new(authority.clone())),
            Arc::new(InvariantHead::with_defaults()),
        ];
        let gate = GateStage::new(
            heads,
            monitor.clone(),
            QuorumEngine::new(config.quorum_policy),
        )
        .with_analyzer(analyzer.clone());

        let memory = Arc::new(MemoryStage::new(ledger.clone()));
        // Denials feed the fingerprint store as low-severity markers, so
        // repeat offenders are visible without auto-blocking anyone.
        let feedback_store = fingerprints.clone();
        memory.set_deny_feedback(Box::new(move |envelope, reasons| {
            let description = reasons
                .first()
                .map(|r| r.code.clone())
                .unwrap_or_else(|| "denied".into());
            feedback_store.add(
                envelope.actor.0.clone(),
                envelope.intent.action.clone(),
                envelope.intent.resource.clone(),
                ThreatSeverity::Low,
                description,
            );
        }));

        let stages: Vec<Arc<dyn WaterfallStage>> = vec![
            Arc::new(StructuralStage::with_clock_skew(
                authority.clone(),
                nonces,
                ChronoDuration::seconds(config.max_clock_skew_seconds),
            )),
            Arc::new(SignatureStage::new(fingerprints.clone())),
            Arc::new(BehavioralStage::new(baselines.clone())),
            Arc::new(ShadowStage::with_threshold(
                simulator,
                config.shadow_divergence_threshold,
            )),
            Arc::new(gate),
            Arc::new(CommitStage::new(coordinator, halt.clone())),
            memory,
        ];
        let engine = WaterfallEngine::new(stages, halt.clone(), deadlock);

        info!(policy = ?config.quorum_policy, block_size = config.block_size, "cascade service constructed");
        Self {
            config,
            halt,
            documents,
            authority,
            fingerprints,
            baselines,
            store,
            ledger,
            analyzer,
            monitor,
            engine,
        }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Run one request through the waterfall.
    pub async fn submit(&self, envelope: RequestEnvelope) -> Result<Decision, ServiceError> {
        let result = self.engine.process(envelope).await?;
        let severity = result.decision.as_ref().map(|d| d.severity);
        Ok(Decision {
            request_id: result.request_id,
            final_decision: result.final_decision,
            aborted_at: result.aborted_at,
            stages: result
                .stage_results
                .into_iter()
                .map(|r| StageSummary {
                    stage: r.stage,
                    decision: r.decision,
                    reasons: r.reasons,
                })
                .collect(),
            record_hash: result.record_hash,
            severity,
        })
    }

    // --- identity and capability administration ---

    pub fn register_identity(&self, document: IdentityDocument) -> Result<(), ServiceError> {
        Ok(self.documents.register(document)?)
    }

    pub fn revoke_identity(&self, id: &PrincipalId, reason: &str) -> Result<(), ServiceError> {
        Ok(self.documents.revoke(id, reason)?)
    }

    pub fn issue_capability(
        &self,
        subject: PrincipalId,
        scopes: Vec<CapabilityScope>,
        binding: TokenBinding,
        delegation: DelegationPolicy,
    ) -> Result<CapabilityToken, ServiceError> {
        Ok(self.authority.issue(subject, scopes, binding, delegation)?)
    }

    pub fn revoke_capability(
        &self,
        token_id: &TokenId,
        reason: Option<String>,
    ) -> Result<(), ServiceError> {
        Ok(self.authority.revoke(token_id, reason)?)
    }

    pub fn rotate_capability(&self, token_id: &TokenId) -> Result<CapabilityToken, ServiceError> {
        Ok(self.authority.rotate(token_id)?)
    }

    // --- fingerprint administration ---

    pub fn add_fingerprint(
        &self,
        actor_pattern: impl Into<String>,
        action_pattern: impl Into<String>,
        resource_pattern: impl Into<String>,
        severity: ThreatSeverity,
        description: impl Into<String>,
    ) -> String {
        self.fingerprints.add(
            actor_pattern,
            action_pattern,
            resource_pattern,
            severity,
            description,
        )
    }

    /// Register a fingerprint keyed on a device attestation proof as well.
    pub fn add_device_fingerprint(
        &self,
        actor_pattern: impl Into<String>,
        device_pattern: impl Into<String>,
        action_pattern: impl Into<String>,
        resource_pattern: impl Into<String>,
        severity: ThreatSeverity,
        description: impl Into<String>,
    ) -> String {
        self.fingerprints.add_with_device(
            actor_pattern,
            device_pattern,
            action_pattern,
            resource_pattern,
            severity,
            description,
        )
    }

    pub fn remove_fingerprint(&self, id: &str) -> bool {
        self.fingerprints.remove(id)
    }

    // --- baseline administration ---

    pub fn baseline_request_count(&self, subject: &PrincipalId) -> u64 {
        self.baselines.request_count(subject)
    }

    /// Current deviation of (action, resource) from the subject's baseline.
    /// Scoring is read-only; the query leaves the history untouched.
    pub fn baseline_deviation(
        &self,
        subject: &PrincipalId,
        action: &str,
        resource: &str,
    ) -> DeviationScore {
        self.baselines
            .score(subject, action, resource, chrono::Utc::now())
    }

    /// Discard a subject's behavioral history.
    pub fn reset_baseline(&self, subject: &PrincipalId) -> bool {
        self.baselines.reset(subject)
    }

    // --- canonical state and ledger queries ---

    pub fn canonical_get(&self, key: &str) -> Option<VersionedValue> {
        self.store.get(key)
    }

    pub fn recent_records(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.ledger.get_records(limit)
    }

    pub fn ledger_block(&self, height: u64) -> Option<LedgerBlock> {
        self.ledger.get_block(height)
    }

    pub fn verify_ledger(&self) -> bool {
        self.ledger.verify_chain()
    }

    pub fn seal_ledger(&self) -> Result<Option<LedgerBlock>, ServiceError> {
        Ok(self.ledger.force_seal()?)
    }

    // --- SAFE-HALT control ---

    pub fn halt(
        &self,
        reason: HaltReason,
        details: impl Into<String>,
        triggered_by: impl Into<String>,
    ) -> Result<(), ServiceError> {
        // Every in-flight write is aborted at its next halt check; record
        // how many there were at the moment of the trip.
        let writes_aborted = self.engine.in_flight() as u64;
        Ok(self
            .halt
            .trigger(reason, details, triggered_by, writes_aborted)?)
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_halted()
    }

    pub fn reset_halt(&self, authorized_by: impl Into<String>) -> Result<(), ServiceError> {
        Ok(self.halt.reset(authorized_by)?)
    }

    pub fn halt_history(&self) -> Vec<HaltEvent> {
        self.halt.history()
    }

    // --- inspection ---

    /// Resilience characteristics of the configured quorum over the three
    /// Cerberus heads.
    pub fn resilience_profile(&self) -> ResilienceProfile {
        ResilienceProfile::for_policy(self.config.quorum_policy, 3)
    }

    /// In-flight requests currently over a stage or pipeline budget.
    pub fn liveness_violations(&self) -> Vec<DeadlockViolation> {
        self.engine.liveness_violations()
    }

    pub fn in_flight_count(&self) -> usize {
        self.engine.in_flight()
    }

    pub fn collusion_signals(&self) -> Vec<CollusionSignal> {
        self.analyzer.collusion_signals()
    }

    pub fn veto_abuse_signals(&self) -> Vec<VetoAbuseSignal> {
        self.analyzer.veto_abuse_signals()
    }

    pub fn head_monitor(&self) -> &HeadMonitor {
        &self.monitor
    }
}
