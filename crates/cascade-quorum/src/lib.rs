//! Cascade Quorum - the Cerberus decision layer.
//!
//! Three independent heads (identity, capability, invariant) each examine a
//! request and cast a [`CerberusVote`]. The quorum engine aggregates the
//! votes under a configured policy into one [`CerberusDecision`]. Vote
//! aggregation is monotonic: a deny or quarantine from any head is never
//! outvoted. The threat-model analyzer watches the vote stream for head
//! collusion and veto abuse.
//!
//! [`CerberusVote`]: cascade_types::CerberusVote
//! [`CerberusDecision`]: cascade_types::CerberusDecision

#![deny(unsafe_code)]

pub mod engine;
pub mod heads;
pub mod resilience;
pub mod threat;

pub use engine::{QuorumEngine, QuorumPolicy};
pub use heads::{CapabilityHead, CerberusHead, IdentityHead, InvariantHead};
pub use resilience::ResilienceProfile;
pub use threat::{CollusionSignal, ThreatModelAnalyzer, VetoAbuseSignal};
