//! Capability authority - issuance, revocation, and rotation of tokens.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use cascade_types::{
    CapabilityScope, CapabilityToken, DelegationPolicy, PrincipalId, Signature, TokenBinding,
    TokenId,
};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::IdentityError;

/// What happened to a token, kept in the authority's append-only audit log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenAuditKind {
    Issued,
    Revoked,
    Rotated,
}

#[derive(Clone, Debug)]
pub struct TokenAuditEvent {
    pub kind: TokenAuditKind,
    pub token_id: TokenId,
    pub subject: PrincipalId,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

struct AuthorityState {
    tokens: HashMap<TokenId, CapabilityToken>,
    revoked: HashSet<TokenId>,
    audit: Vec<TokenAuditEvent>,
}

/// Issues and manages capability tokens for the deployment.
///
/// The authority enforces two of its own rules on top of token invariants:
/// it never issues to itself, and it caps how many actions a single scope
/// may grant.
pub struct CapabilityAuthority {
    authority_id: PrincipalId,
    default_ttl: Duration,
    max_scope_actions: usize,
    state: RwLock<AuthorityState>,
}

impl CapabilityAuthority {
    pub const DEFAULT_TTL_HOURS: i64 = 24;
    pub const DEFAULT_MAX_SCOPE_ACTIONS: usize = 8;

    pub fn new(authority_id: PrincipalId) -> Self {
        Self::with_limits(
            authority_id,
            Duration::hours(Self::DEFAULT_TTL_HOURS),
            Self::DEFAULT_MAX_SCOPE_ACTIONS,
        )
    }

    pub fn with_limits(
        authority_id: PrincipalId,
        default_ttl: Duration,
        max_scope_actions: usize,
    ) -> Self {
        Self {
            authority_id,
            default_ttl,
            max_scope_actions,
            state: RwLock::new(AuthorityState {
                tokens: HashMap::new(),
                revoked: HashSet::new(),
                audit: Vec::new(),
            }),
        }
    }

    pub fn authority_id(&self) -> &PrincipalId {
        &self.authority_id
    }

    /// Issue a token to `subject` with the given scopes.
    pub fn issue(
        &self,
        subject: PrincipalId,
        scopes: Vec<CapabilityScope>,
        binding: TokenBinding,
        delegation: DelegationPolicy,
    ) -> Result<CapabilityToken, IdentityError> {
        if subject == self.authority_id {
            return Err(IdentityError::SelfIssuance);
        }
        for scope in &scopes {
            if scope.actions.len() > self.max_scope_actions {
                return Err(IdentityError::ExcessiveScope {
                    actions: scope.actions.len(),
                    max: self.max_scope_actions,
                });
            }
        }

        let now = Utc::now();
        let token = CapabilityToken {
            token_id: TokenId::generate(),
            issuer: self.authority_id.clone(),
            subject: subject.clone(),
            issued_at: now,
            expires_at: now + self.default_ttl,
            nonce: format!("n_{}", uuid::Uuid::new_v4()),
            scopes,
            delegation,
            binding,
            signature: Signature::new("ed25519", "authority", ""),
        };
        token.validate()?;

        let mut state = self.state.write().map_err(|_| IdentityError::LockPoisoned)?;
        state.audit.push(TokenAuditEvent {
            kind: TokenAuditKind::Issued,
            token_id: token.token_id.clone(),
            subject,
            at: now,
            reason: None,
        });
        state.tokens.insert(token.token_id.clone(), token.clone());
        info!(token = %token.token_id, subject = %token.subject, "capability issued");
        Ok(token)
    }

    pub fn get(&self, token_id: &TokenId) -> Result<Option<CapabilityToken>, IdentityError> {
        let state = self.state.read().map_err(|_| IdentityError::LockPoisoned)?;
        Ok(state.tokens.get(token_id).cloned())
    }

    /// Revoke a token. Idempotent: re-revoking an already revoked token
    /// succeeds; revoking an unknown token fails.
    pub fn revoke(&self, token_id: &TokenId, reason: Option<String>) -> Result<(), IdentityError> {
        let mut state = self.state.write().map_err(|_| IdentityError::LockPoisoned)?;
        if !state.tokens.contains_key(token_id) {
            return Err(IdentityError::TokenNotFound(token_id.0.clone()));
        }
        if state.revoked.insert(token_id.clone()) {
            let subject = state.tokens[token_id].subject.clone();
            state.audit.push(TokenAuditEvent {
                kind: TokenAuditKind::Revoked,
                token_id: token_id.clone(),
                subject,
                at: Utc::now(),
                reason,
            });
        }
        Ok(())
    }

    /// Revoke the old token and issue a fresh one with identical scopes.
    pub fn rotate(&self, token_id: &TokenId) -> Result<CapabilityToken, IdentityError> {
        let old = self
            .get(token_id)?
            .ok_or_else(|| IdentityError::TokenNotFound(token_id.0.clone()))?;
        self.revoke(token_id, Some("rotated".into()))?;
        let new = self.issue(
            old.subject.clone(),
            old.scopes.clone(),
            old.binding.clone(),
            old.delegation.clone(),
        )?;

        let mut state = self.state.write().map_err(|_| IdentityError::LockPoisoned)?;
        state.audit.push(TokenAuditEvent {
            kind: TokenAuditKind::Rotated,
            token_id: new.token_id.clone(),
            subject: old.subject,
            at: Utc::now(),
            reason: Some(format!("replaces {}", token_id)),
        });
        Ok(new)
    }

    pub fn is_revoked(&self, token_id: &TokenId) -> bool {
        self.state
            .read()
            .map(|state| state.revoked.contains(token_id))
            .unwrap_or(true)
    }

    /// Known, unrevoked, unexpired.
    pub fn is_valid(&self, token_id: &TokenId, now: DateTime<Utc>) -> bool {
        let state = match self.state.read() {
            Ok(state) => state,
            Err(_) => return false,
        };
        if state.revoked.contains(token_id) {
            return false;
        }
        state
            .tokens
            .get(token_id)
            .map(|t| !t.is_expired(now))
            .unwrap_or(false)
    }

    /// Tokens ever issued, revoked or not.
    pub fn token_count(&self) -> usize {
        self.state.read().map(|state| state.tokens.len()).unwrap_or(0)
    }

    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.state
            .read()
            .map(|state| {
                state
                    .tokens
                    .values()
                    .filter(|t| !state.revoked.contains(&t.token_id) && !t.is_expired(now))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn audit_log(&self) -> Vec<TokenAuditEvent> {
        self.state
            .read()
            .map(|state| state.audit.clone())
            .unwrap_or_default()
    }
}
