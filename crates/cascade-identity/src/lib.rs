//! Cascade Identity - the stores behind authorization.
//!
//! Identity documents say who a principal is; capability tokens say what it
//! may do; the nonce cache guarantees a token reference is only honored
//! once. All stores are explicitly constructed and dependency-injected into
//! the stages that use them - no global singletons.

#![deny(unsafe_code)]

pub mod documents;
pub mod nonce;
pub mod tokens;

pub use documents::{DeviceAttestationRegistry, IdentityDocumentStore};
pub use nonce::NonceCache;
pub use tokens::{CapabilityAuthority, TokenAuditEvent, TokenAuditKind};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity document already registered for {0}")]
    DuplicateDocument(String),

    #[error("identity document not found: {0}")]
    DocumentNotFound(String),

    #[error("capability token not found: {0}")]
    TokenNotFound(String),

    #[error("authority may not issue a capability to itself")]
    SelfIssuance,

    #[error("scope grants {actions} actions; authority ceiling is {max}")]
    ExcessiveScope { actions: usize, max: usize },

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] cascade_types::TypesError),

    #[error("store lock poisoned")]
    LockPoisoned,
}
