//! Governance policy.
//!
//! A serializable transition table over (action, current status). Policies
//! are deterministic data; their snapshot hash proves which table was in
//! force when a baseline was written.

use crate::record::ScenarioStatus;
use serde::{Deserialize, Serialize};
use shadow_core::{Map, PolicySnapshot, ShadowError, ShadowResult, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Policy id of the built-in table
pub const DEFAULT_GOVERNANCE_POLICY_ID: &str = "default-governance-v1";

/// Lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernanceAction {
    /// Create or refresh an approved baseline
    Approve,
    /// Retire a baseline
    Deprecate,
}

impl GovernanceAction {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deprecate => "deprecate",
        }
    }

    /// Status the action leads to
    #[must_use]
    pub const fn target_status(&self) -> ScenarioStatus {
        match self {
            Self::Approve => ScenarioStatus::Approved,
            Self::Deprecate => ScenarioStatus::Deprecated,
        }
    }
}

impl fmt::Display for GovernanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Whether the action may proceed
    pub allowed: bool,
    /// Stable reason code
    pub reason_code: String,
    /// Human explanation
    pub explanation: String,
}

impl Transition {
    /// Allowed transition
    #[must_use]
    pub fn allow(reason_code: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason_code: reason_code.into(),
            explanation: explanation.into(),
        }
    }

    /// Denied transition
    #[must_use]
    pub fn deny(reason_code: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason_code: reason_code.into(),
            explanation: explanation.into(),
        }
    }
}

/// Governance transition table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovernancePolicy {
    policy_id: String,
    transitions: BTreeMap<(GovernanceAction, ScenarioStatus), Transition>,
}

impl Default for GovernancePolicy {
    fn default() -> Self {
        use GovernanceAction::{Approve, Deprecate};
        use ScenarioStatus::{Approved, Deprecated, Pending};

        Self::new(DEFAULT_GOVERNANCE_POLICY_ID)
            .with_transition(
                Approve,
                Pending,
                Transition::allow("APPROVE_ALLOWED", "Pending scenario approved and versioned."),
            )
            .with_transition(
                Approve,
                Approved,
                Transition::allow(
                    "REAPPROVE_ALLOWED",
                    "Approved scenario updated with a new version.",
                ),
            )
            .with_transition(
                Approve,
                Deprecated,
                Transition::allow(
                    "REACTIVATE_ALLOWED",
                    "Deprecated scenario reactivated and approved.",
                ),
            )
            .with_transition(
                Deprecate,
                Approved,
                Transition::allow("DEPRECATE_ALLOWED", "Approved scenario marked as deprecated."),
            )
            .with_transition(
                Deprecate,
                Pending,
                Transition::allow(
                    "DEPRECATE_PENDING_ALLOWED",
                    "Pending scenario marked as deprecated.",
                ),
            )
            .with_transition(
                Deprecate,
                Deprecated,
                Transition::allow(
                    "NOOP_DEPRECATE",
                    "Scenario already deprecated; action logged for audit.",
                ),
            )
    }
}

impl GovernancePolicy {
    /// Empty table
    #[must_use]
    pub fn new(policy_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            transitions: BTreeMap::new(),
        }
    }

    /// Add or replace a table entry
    #[must_use]
    pub fn with_transition(
        mut self,
        action: GovernanceAction,
        from: ScenarioStatus,
        transition: Transition,
    ) -> Self {
        self.transitions.insert((action, from), transition);
        self
    }

    /// Resolve a policy by name
    ///
    /// `None`, `default` and `default-v1` (any case) select the built-in table.
    ///
    /// # Errors
    ///
    /// Returns `GovernancePolicy` for any other name
    pub fn resolve(name: Option<&str>) -> ShadowResult<Self> {
        let selected = name.unwrap_or("default").trim().to_lowercase();
        match selected.as_str() {
            "default" | "default-v1" => Ok(Self::default()),
            other => Err(ShadowError::governance_policy(format!(
                "Unsupported governance policy: {}",
                other
            ))),
        }
    }

    /// Policy id
    #[must_use]
    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    /// Table entry for an action from a status
    #[must_use]
    pub fn transition(&self, action: GovernanceAction, from: ScenarioStatus) -> Option<&Transition> {
        self.transitions.get(&(action, from))
    }

    /// Number of table entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Content-addressed snapshot for record metadata
    ///
    /// Transitions are listed sorted by (action, from) wire names.
    #[must_use]
    pub fn snapshot(&self) -> PolicySnapshot {
        let mut rows: Vec<(&str, &str, &Transition)> = self
            .transitions
            .iter()
            .map(|((action, from), t)| (action.as_str(), from.as_str(), t))
            .collect();
        rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let transitions = rows
            .into_iter()
            .map(|(action, from, t)| {
                let mut row = Map::new();
                row.insert("action".to_string(), Value::from(action));
                row.insert("from".to_string(), Value::from(from));
                row.insert("allowed".to_string(), Value::Bool(t.allowed));
                row.insert("reason_code".to_string(), Value::from(t.reason_code.as_str()));
                row.insert("explanation".to_string(), Value::from(t.explanation.as_str()));
                Value::Object(row)
            })
            .collect();

        let mut payload = Map::new();
        payload.insert("policy_id".to_string(), Value::from(self.policy_id.as_str()));
        payload.insert("transitions".to_string(), Value::Array(transitions));
        PolicySnapshot::seal(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = GovernancePolicy::default();
        assert_eq!(policy.policy_id(), "default-governance-v1");
        assert_eq!(policy.len(), 6);
        let t = policy
            .transition(GovernanceAction::Approve, ScenarioStatus::Pending)
            .unwrap();
        assert!(t.allowed);
        assert_eq!(t.reason_code, "APPROVE_ALLOWED");
        let t = policy
            .transition(GovernanceAction::Deprecate, ScenarioStatus::Deprecated)
            .unwrap();
        assert_eq!(t.reason_code, "NOOP_DEPRECATE");
    }

    #[test]
    fn test_resolve_by_name() {
        assert_eq!(GovernancePolicy::resolve(None).unwrap(), GovernancePolicy::default());
        assert!(GovernancePolicy::resolve(Some("Default-V1")).is_ok());
        let err = GovernancePolicy::resolve(Some("strict-v9")).unwrap_err();
        assert_eq!(err.code(), "GOVERNANCE_POLICY");
        assert_eq!(err.explanation(), "Unsupported governance policy: strict-v9");
    }

    #[test]
    fn test_snapshot_rows_sorted() {
        let snap = GovernancePolicy::default().snapshot();
        assert!(snap.verify());
        let rows = snap.as_value().get("transitions").unwrap().as_array().unwrap();
        let pairs: Vec<(String, String)> = rows
            .iter()
            .map(|r| {
                (
                    r.get("action").and_then(Value::as_str).unwrap().to_string(),
                    r.get("from").and_then(Value::as_str).unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            pairs.first(),
            Some(&("approve".to_string(), "approved".to_string()))
        );
        assert_eq!(
            pairs.last(),
            Some(&("deprecate".to_string(), "pending".to_string()))
        );
    }

    #[test]
    fn test_snapshot_changes_with_table() {
        let base = GovernancePolicy::default();
        let changed = GovernancePolicy::default().with_transition(
            GovernanceAction::Approve,
            ScenarioStatus::Deprecated,
            Transition::deny("REACTIVATE_DENIED", "No reactivation."),
        );
        assert_ne!(base.snapshot().hash(), changed.snapshot().hash());
        assert_eq!(base.snapshot(), GovernancePolicy::default().snapshot());
    }
}
