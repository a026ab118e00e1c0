//! The seven waterfall stages, in pipeline order.

mod behavioral;
mod commit;
mod gate;
mod memory;
mod shadow;
mod signature;
mod structural;

pub use behavioral::BehavioralStage;
pub use commit::CommitStage;
pub use gate::GateStage;
pub use memory::{DenyFeedbackHook, MemoryStage};
pub use shadow::ShadowStage;
pub use signature::SignatureStage;
pub use structural::StructuralStage;
