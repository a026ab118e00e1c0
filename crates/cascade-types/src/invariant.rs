//! Invariant definitions - governance-signed rules the pipeline enforces.

use serde::{Deserialize, Serialize};

use crate::shadow::ViolationSeverity;
use crate::Signature;

/// How deeply an invariant is entrenched.
///
/// Immutable-scope invariants can never be relaxed: no API exists to
/// downgrade or remove them once registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantScope {
    Immutable,
    Constitutional,
    Operational,
}

/// What the pipeline does when the invariant trips.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    HardDeny,
    Quarantine,
    RateLimit,
    RequireShadow,
    RequireQuorum,
}

/// An embedded test case proving the invariant expression behaves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvariantTestCase {
    pub input: serde_json::Value,
    pub expect_violation: bool,
}

/// A governance-signed invariant definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvariantDefinition {
    pub invariant_id: String,
    pub scope: InvariantScope,
    pub severity: ViolationSeverity,
    pub enforcement: EnforcementAction,
    /// Formal expression, e.g. a protected resource prefix predicate.
    pub expression: String,
    #[serde(default)]
    pub test_cases: Vec<InvariantTestCase>,
    pub signature: Signature,
}

impl InvariantDefinition {
    pub fn is_relaxable(&self) -> bool {
        !matches!(self.scope, InvariantScope::Immutable)
    }

    /// The resource prefix protected when the expression is a
    /// `protect_prefix:<prefix>` predicate.
    pub fn protected_prefix(&self) -> Option<&str> {
        self.expression.strip_prefix("protect_prefix:")
    }

    /// Whether the expression holds for `resource`.
    pub fn applies_to(&self, resource: &str) -> bool {
        self.protected_prefix()
            .map(|prefix| resource.starts_with(prefix))
            .unwrap_or(false)
    }

    /// Run the embedded test cases against the expression. A definition
    /// whose own test cases fail must not be enforced.
    pub fn self_check(&self) -> bool {
        self.test_cases.iter().all(|case| {
            let resource = case
                .input
                .get("resource")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            self.applies_to(resource) == case.expect_violation
        })
    }

    /// The definition content bound by the governance signature.
    pub fn signable_content(&self) -> serde_json::Value {
        serde_json::json!({
            "invariant_id": self.invariant_id,
            "scope": self.scope,
            "severity": self.severity,
            "enforcement": self.enforcement,
            "expression": self.expression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(expression: &str) -> InvariantDefinition {
        InvariantDefinition {
            invariant_id: "INV-ROOT-001".into(),
            scope: InvariantScope::Immutable,
            severity: ViolationSeverity::Fatal,
            enforcement: EnforcementAction::HardDeny,
            expression: expression.into(),
            test_cases: vec![],
            signature: Signature::new("ed25519", "gov", "sig"),
        }
    }

    #[test]
    fn immutable_invariants_cannot_relax() {
        assert!(!definition("protect_prefix:state://invariant/").is_relaxable());
    }

    #[test]
    fn prefix_expression_matches_resources() {
        let def = definition("protect_prefix:ledger://");
        assert!(def.applies_to("ledger://blocks/0"));
        assert!(!def.applies_to("state://data/k"));
        // An expression outside the grammar protects nothing.
        assert!(!definition("arbitrary predicate").applies_to("ledger://blocks/0"));
    }

    #[test]
    fn self_check_runs_the_embedded_cases() {
        let mut def = definition("protect_prefix:ledger://");
        def.test_cases = vec![
            InvariantTestCase {
                input: serde_json::json!({"resource": "ledger://blocks/0"}),
                expect_violation: true,
            },
            InvariantTestCase {
                input: serde_json::json!({"resource": "state://data/k"}),
                expect_violation: false,
            },
        ];
        assert!(def.self_check());

        def.test_cases.push(InvariantTestCase {
            input: serde_json::json!({"resource": "state://other"}),
            expect_violation: true,
        });
        assert!(!def.self_check());
    }
}
