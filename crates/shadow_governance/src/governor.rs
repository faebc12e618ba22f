//! Governance state machine.
//!
//! The [`Governor`] evaluates lifecycle actions against a policy table and
//! produces new records; it never mutates its inputs. Persisting a record is
//! a read-modify-write of one file with no locking, so concurrent
//! approve/deprecate calls on the same record need external serialization.

use crate::policy::{GovernanceAction, GovernancePolicy};
use crate::record::{
    new_version_id, ApprovalAction, ApprovalEntry, BaselineMetadata, BaselineRecord,
    CaptureScenario, ScenarioStatus,
};
use crate::store::{load_record_with_clock, save_record, LoadLimits};
use serde::{Deserialize, Serialize};
use shadow_core::{sha256_hex, Clock, ShadowError, ShadowResult, SystemClock, ENGINE_VERSION};
use shadow_diff::DiffPolicy;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Reason code when a custom validator allows an unlisted transition
pub const CUSTOM_TRANSITION_ALLOWED: &str = "CUSTOM_TRANSITION_ALLOWED";

/// Reason code when a custom validator denies an unlisted transition
pub const CUSTOM_TRANSITION_DENIED: &str = "CUSTOM_TRANSITION_DENIED";

/// Reason code when non-strict mode allows an unlisted transition
pub const STRICT_GOVERNANCE_DISABLED: &str = "STRICT_GOVERNANCE_DISABLED";

/// Hex characters in a decision id
const DECISION_ID_LEN: usize = 12;

/// Auditable outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the action may proceed
    pub allowed: bool,
    /// Stable reason code
    pub reason_code: String,
    /// Human explanation
    pub explanation: String,
    /// Policy that decided
    pub policy_id: String,
    /// Deterministic correlation id for (policy, action, status)
    pub decision_id: String,
}

/// Strategy consulted for (action, status) pairs absent from the table
///
/// Returns `Some(allowed)` to decide, or `None` to defer to strict/non-strict
/// handling.
pub trait TransitionValidator: Send + Sync {
    /// Decide a transition from `from` to `to`
    fn validate(&self, from: ScenarioStatus, to: ScenarioStatus) -> Option<bool>;
}

impl<F> TransitionValidator for F
where
    F: Fn(ScenarioStatus, ScenarioStatus) -> Option<bool> + Send + Sync,
{
    fn validate(&self, from: ScenarioStatus, to: ScenarioStatus) -> Option<bool> {
        self(from, to)
    }
}

/// Deterministic decision id: first 12 hex chars of SHA-256(`policy:action:status`)
#[must_use]
pub fn decision_id(policy_id: &str, action: GovernanceAction, status: ScenarioStatus) -> String {
    let mut id = sha256_hex(&format!("{}:{}:{}", policy_id, action, status));
    id.truncate(DECISION_ID_LEN);
    id
}

/// Evaluate an action against a policy
///
/// Listed pairs use the table. For unlisted pairs the validator decides if
/// it returns a verdict; otherwise strict mode fails and non-strict mode
/// allows with [`STRICT_GOVERNANCE_DISABLED`].
///
/// # Errors
///
/// Returns `GovernancePolicy` for an unlisted pair in strict mode
pub fn evaluate_decision(
    action: GovernanceAction,
    status: ScenarioStatus,
    policy: &GovernancePolicy,
    strict: bool,
    validator: Option<&dyn TransitionValidator>,
) -> ShadowResult<Decision> {
    let decide = |allowed: bool, reason_code: &str, explanation: &str| Decision {
        allowed,
        reason_code: reason_code.to_string(),
        explanation: explanation.to_string(),
        policy_id: policy.policy_id().to_string(),
        decision_id: decision_id(policy.policy_id(), action, status),
    };

    if let Some(t) = policy.transition(action, status) {
        return Ok(decide(t.allowed, &t.reason_code, &t.explanation));
    }

    if let Some(allowed) = validator.and_then(|v| v.validate(status, action.target_status())) {
        return Ok(if allowed {
            decide(
                true,
                CUSTOM_TRANSITION_ALLOWED,
                "Custom governance transition validator allowed transition.",
            )
        } else {
            decide(
                false,
                CUSTOM_TRANSITION_DENIED,
                "Custom governance transition validator denied transition.",
            )
        });
    }

    if strict {
        return Err(ShadowError::governance_policy(format!(
            "Invalid governance transition: {} -> {}",
            action, status
        )));
    }

    tracing::warn!(
        policy_id = policy.policy_id(),
        action = %action,
        status = %status,
        "unlisted governance transition allowed because strict governance is disabled"
    );
    Ok(decide(
        true,
        STRICT_GOVERNANCE_DISABLED,
        "Unknown governance transition allowed because strict governance is disabled.",
    ))
}

/// Applies governance to baseline records
#[derive(Clone)]
pub struct Governor {
    policy: GovernancePolicy,
    diff_policy: DiffPolicy,
    strict: bool,
    validator: Option<Arc<dyn TransitionValidator>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for Governor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Governor")
            .field("policy_id", &self.policy.policy_id())
            .field("diff_policy_id", &self.diff_policy.policy_id)
            .field("strict", &self.strict)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl Default for Governor {
    fn default() -> Self {
        Self::new(GovernancePolicy::default(), DiffPolicy::default())
    }
}

impl Governor {
    /// Strict governor over the given policies
    #[must_use]
    pub fn new(policy: GovernancePolicy, diff_policy: DiffPolicy) -> Self {
        Self {
            policy,
            diff_policy,
            strict: true,
            validator: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Toggle strict mode
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Install a validator for unlisted transitions
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn TransitionValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Governance policy in force
    #[must_use]
    pub fn policy(&self) -> &GovernancePolicy {
        &self.policy
    }

    /// Diff policy snapshotted on approval
    #[must_use]
    pub fn diff_policy(&self) -> &DiffPolicy {
        &self.diff_policy
    }

    /// Whether unlisted transitions fail
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Evaluate an action from a status
    ///
    /// # Errors
    ///
    /// See [`evaluate_decision`]
    pub fn evaluate(&self, action: GovernanceAction, status: ScenarioStatus) -> ShadowResult<Decision> {
        evaluate_decision(action, status, &self.policy, self.strict, self.validator.as_deref())
    }

    /// Approve a scenario, creating or updating its baseline
    ///
    /// With no prior record the scenario starts out pending. On success the
    /// scenario payload is replaced, the record becomes approved with a fresh
    /// version id and fresh policy snapshots, and an `approve` entry is
    /// appended to its history.
    ///
    /// # Errors
    ///
    /// Returns `GovernancePolicy` when the transition is denied or unlisted in
    /// strict mode; nothing is changed in that case
    pub fn approve(
        &self,
        current: Option<&BaselineRecord>,
        scenario: CaptureScenario,
    ) -> ShadowResult<BaselineRecord> {
        let status = current.map_or(ScenarioStatus::Pending, BaselineRecord::status);
        let decision = self.evaluate(GovernanceAction::Approve, status)?;
        if !decision.allowed {
            return Err(denied("approve", &decision));
        }

        let mut record = match current {
            Some(existing) => existing.clone(),
            None => BaselineRecord {
                scenario: scenario.clone(),
                metadata: BaselineMetadata::pending(self.clock.as_ref()),
                approval_history: Vec::new(),
            },
        };
        let now = self.clock.now_iso();
        record.scenario = with_engine_version(scenario);
        record.metadata.approved_at = Some(now.clone());
        record.metadata.status = ScenarioStatus::Approved;
        record.metadata.version_id = new_version_id();
        self.stamp_snapshots(&mut record.metadata);
        record
            .approval_history
            .push(ApprovalEntry::new(now, ApprovalAction::Approve));

        tracing::info!(
            scenario = %record.key(),
            from = %status,
            reason_code = %decision.reason_code,
            decision_id = %decision.decision_id,
            version_id = %record.metadata.version_id,
            "baseline approved"
        );
        Ok(record)
    }

    /// Deprecate a baseline
    ///
    /// The scenario payload and policy snapshots are left untouched; a
    /// `deprecate` entry is appended even when the record was already
    /// deprecated.
    ///
    /// # Errors
    ///
    /// Returns `GovernancePolicy` when the transition is denied or unlisted in
    /// strict mode
    pub fn deprecate(&self, current: &BaselineRecord) -> ShadowResult<BaselineRecord> {
        let status = current.status();
        let decision = self.evaluate(GovernanceAction::Deprecate, status)?;
        if !decision.allowed {
            return Err(denied("deprecate", &decision));
        }

        let mut record = current.clone();
        record.metadata.status = ScenarioStatus::Deprecated;
        record
            .approval_history
            .push(ApprovalEntry::new(self.clock.now_iso(), ApprovalAction::Deprecate));

        tracing::info!(
            scenario = %record.key(),
            from = %status,
            reason_code = %decision.reason_code,
            decision_id = %decision.decision_id,
            "baseline deprecated"
        );
        Ok(record)
    }

    /// Build an approved baseline directly from a capture
    #[must_use]
    pub fn create_from_capture(&self, scenario: CaptureScenario) -> BaselineRecord {
        let now = self.clock.now_iso();
        let mut metadata = BaselineMetadata::pending(self.clock.as_ref());
        metadata.approved_at = Some(now.clone());
        metadata.status = ScenarioStatus::Approved;
        self.stamp_snapshots(&mut metadata);

        let record = BaselineRecord {
            scenario: with_engine_version(scenario),
            metadata,
            approval_history: vec![ApprovalEntry::new(now, ApprovalAction::Record)],
        };
        tracing::info!(scenario = %record.key(), version_id = %record.metadata.version_id, "baseline recorded");
        record
    }

    /// Approve into the record file at `path`, creating it if absent
    ///
    /// # Errors
    ///
    /// Returns load errors for an existing invalid file, governance errors,
    /// or `Io` if the file cannot be written
    pub fn approve_path(
        &self,
        path: &Path,
        scenario: CaptureScenario,
        limits: &LoadLimits,
    ) -> ShadowResult<BaselineRecord> {
        let existing = if path.exists() {
            Some(load_record_with_clock(path, limits, self.clock.as_ref())?)
        } else {
            None
        };
        let record = self.approve(existing.as_ref(), scenario)?;
        save_record(path, &record)?;
        Ok(record)
    }

    /// Deprecate the record file at `path`
    ///
    /// # Errors
    ///
    /// Returns load errors, governance errors, or `Io` if the file cannot be
    /// written
    pub fn deprecate_path(&self, path: &Path, limits: &LoadLimits) -> ShadowResult<BaselineRecord> {
        let existing = load_record_with_clock(path, limits, self.clock.as_ref())?;
        let record = self.deprecate(&existing)?;
        save_record(path, &record)?;
        Ok(record)
    }

    fn stamp_snapshots(&self, metadata: &mut BaselineMetadata) {
        metadata.diff_policy_snapshot = Some(self.diff_policy.snapshot());
        metadata.governance_policy_snapshot = Some(self.policy.snapshot());
    }
}

fn with_engine_version(mut scenario: CaptureScenario) -> CaptureScenario {
    if scenario.engine_version.is_none() {
        scenario.engine_version = Some(ENGINE_VERSION.to_string());
    }
    scenario
}

fn denied(verb: &str, decision: &Decision) -> ShadowError {
    ShadowError::governance_policy(format!(
        "Cannot {} scenario: {}: {}",
        verb, decision.reason_code, decision.explanation
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Transition;
    use crate::record::CaptureOutput;
    use crate::store::RecordStore;
    use chrono::{TimeZone, Utc};
    use shadow_core::{FixedClock, Map, Value};
    use tempfile::TempDir;

    fn scenario(result: i64) -> CaptureScenario {
        let mut input = Map::new();
        input.insert("x".to_string(), Value::Int(1));
        CaptureScenario::new("billing", "total", input, CaptureOutput::success(result))
    }

    fn fixed_governor() -> Governor {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        Governor::default().with_clock(Arc::new(FixedClock::new(at)))
    }

    #[test]
    fn test_evaluate_listed_transitions() {
        let gov = Governor::default();
        let d = gov.evaluate(GovernanceAction::Approve, ScenarioStatus::Pending).unwrap();
        assert!(d.allowed);
        assert_eq!(d.reason_code, "APPROVE_ALLOWED");
        assert_eq!(d.policy_id, "default-governance-v1");
        assert_eq!(d.decision_id.len(), 12);

        let d = gov.evaluate(GovernanceAction::Deprecate, ScenarioStatus::Deprecated).unwrap();
        assert!(d.allowed);
        assert_eq!(d.reason_code, "NOOP_DEPRECATE");
    }

    #[test]
    fn test_decision_id_deterministic() {
        let a = decision_id("p", GovernanceAction::Approve, ScenarioStatus::Pending);
        let b = decision_id("p", GovernanceAction::Approve, ScenarioStatus::Pending);
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex("p:approve:pending")[..12]);
        assert_ne!(a, decision_id("p", GovernanceAction::Deprecate, ScenarioStatus::Pending));
    }

    #[test]
    fn test_unlisted_transition_strict_fails() {
        let gov = Governor::new(GovernancePolicy::new("empty"), DiffPolicy::default());
        let err = gov.evaluate(GovernanceAction::Approve, ScenarioStatus::Pending).unwrap_err();
        assert_eq!(err.code(), "GOVERNANCE_POLICY");
        assert_eq!(err.explanation(), "Invalid governance transition: approve -> pending");
    }

    #[test]
    fn test_unlisted_transition_non_strict_is_advisory() {
        let gov = Governor::new(GovernancePolicy::new("empty"), DiffPolicy::default()).with_strict(false);
        let d = gov.evaluate(GovernanceAction::Deprecate, ScenarioStatus::Approved).unwrap();
        assert!(d.allowed);
        assert_eq!(d.reason_code, STRICT_GOVERNANCE_DISABLED);
    }

    #[test]
    fn test_custom_validator_decides_unlisted() {
        let validator = |from: ScenarioStatus, to: ScenarioStatus| -> Option<bool> {
            match (from, to) {
                (ScenarioStatus::Pending, ScenarioStatus::Approved) => Some(true),
                (ScenarioStatus::Approved, ScenarioStatus::Deprecated) => Some(false),
                _ => None,
            }
        };
        let gov = Governor::new(GovernancePolicy::new("empty"), DiffPolicy::default())
            .with_validator(Arc::new(validator));

        let d = gov.evaluate(GovernanceAction::Approve, ScenarioStatus::Pending).unwrap();
        assert!(d.allowed);
        assert_eq!(d.reason_code, CUSTOM_TRANSITION_ALLOWED);

        let d = gov.evaluate(GovernanceAction::Deprecate, ScenarioStatus::Approved).unwrap();
        assert!(!d.allowed);
        assert_eq!(d.reason_code, CUSTOM_TRANSITION_DENIED);

        assert!(gov.evaluate(GovernanceAction::Approve, ScenarioStatus::Deprecated).is_err());
    }

    #[test]
    fn test_validator_not_consulted_for_listed_pairs() {
        let gov = Governor::default().with_validator(Arc::new(|_: ScenarioStatus, _: ScenarioStatus| Some(false)));
        let d = gov.evaluate(GovernanceAction::Approve, ScenarioStatus::Pending).unwrap();
        assert_eq!(d.reason_code, "APPROVE_ALLOWED");
    }

    #[test]
    fn test_first_approval() {
        let gov = fixed_governor();
        let record = gov.approve(None, scenario(1)).unwrap();
        assert_eq!(record.status(), ScenarioStatus::Approved);
        assert_eq!(record.metadata.approved_at.as_deref(), Some("2024-06-01T08:00:00+00:00"));
        assert_eq!(record.metadata.created_at, "2024-06-01T08:00:00+00:00");
        assert_eq!(record.approval_history.len(), 1);
        assert_eq!(record.approval_history[0].action, ApprovalAction::Approve);
        assert!(record.metadata.diff_policy_snapshot.as_ref().unwrap().verify());
        assert!(record.metadata.governance_policy_snapshot.as_ref().unwrap().verify());
    }

    #[test]
    fn test_reapproval_changes_version_and_payload() {
        let gov = fixed_governor();
        let first = gov.approve(None, scenario(1)).unwrap();
        let second = gov.approve(Some(&first), scenario(2)).unwrap();
        assert_ne!(first.metadata.version_id, second.metadata.version_id);
        assert_eq!(second.scenario.output, CaptureOutput::success(2));
        assert_eq!(second.approval_history.len(), 2);
        assert_eq!(first.approval_history.len(), 1);
    }

    #[test]
    fn test_denied_approval_changes_nothing() {
        let policy = GovernancePolicy::default().with_transition(
            GovernanceAction::Approve,
            ScenarioStatus::Deprecated,
            Transition::deny("REACTIVATE_DENIED", "Deprecated baselines stay retired."),
        );
        let gov = Governor::new(policy, DiffPolicy::default());
        let approved = gov.approve(None, scenario(1)).unwrap();
        let deprecated = gov.deprecate(&approved).unwrap();
        let err = gov.approve(Some(&deprecated), scenario(2)).unwrap_err();
        assert_eq!(err.code(), "GOVERNANCE_POLICY");
        assert!(err.explanation().starts_with("Cannot approve scenario: REACTIVATE_DENIED"));
        assert_eq!(deprecated.status(), ScenarioStatus::Deprecated);
    }

    #[test]
    fn test_deprecate_keeps_payload_and_snapshots() {
        let gov = fixed_governor();
        let approved = gov.approve(None, scenario(1)).unwrap();
        let deprecated = gov.deprecate(&approved).unwrap();
        assert_eq!(deprecated.status(), ScenarioStatus::Deprecated);
        assert_eq!(deprecated.scenario, approved.scenario);
        assert_eq!(deprecated.metadata.version_id, approved.metadata.version_id);
        assert_eq!(
            deprecated.metadata.diff_policy_snapshot,
            approved.metadata.diff_policy_snapshot
        );

        let again = gov.deprecate(&deprecated).unwrap();
        assert_eq!(again.status(), ScenarioStatus::Deprecated);
        assert_eq!(again.approval_history.len(), 3);
    }

    #[test]
    fn test_reactivation() {
        let gov = fixed_governor();
        let approved = gov.approve(None, scenario(1)).unwrap();
        let deprecated = gov.deprecate(&approved).unwrap();
        let revived = gov.approve(Some(&deprecated), scenario(1)).unwrap();
        assert_eq!(revived.status(), ScenarioStatus::Approved);
        let actions: Vec<ApprovalAction> = revived.approval_history.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![ApprovalAction::Approve, ApprovalAction::Deprecate, ApprovalAction::Approve]
        );
    }

    #[test]
    fn test_create_from_capture() {
        let gov = fixed_governor();
        let mut capture = scenario(5);
        capture.engine_version = None;
        let record = gov.create_from_capture(capture);
        assert_eq!(record.status(), ScenarioStatus::Approved);
        assert_eq!(record.approval_history[0].action, ApprovalAction::Record);
        assert_eq!(record.scenario.engine_version.as_deref(), Some(ENGINE_VERSION));
        assert!(record.metadata.approved_at.is_some());
    }

    #[test]
    fn test_path_workflow() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let gov = fixed_governor();
        let path = store.path_for(&scenario(1).key());

        let approved = gov.approve_path(&path, scenario(1), store.limits()).unwrap();
        assert_eq!(store.load(&path).unwrap(), approved);

        let reapproved = gov.approve_path(&path, scenario(2), store.limits()).unwrap();
        assert_eq!(reapproved.approval_history.len(), 2);

        let deprecated = gov.deprecate_path(&path, store.limits()).unwrap();
        assert_eq!(store.load(&path).unwrap().status(), ScenarioStatus::Deprecated);
        assert_eq!(deprecated.approval_history.len(), 3);
    }

    #[test]
    fn test_deprecate_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = fixed_governor()
            .deprecate_path(&dir.path().join("none.json"), &LoadLimits::default())
            .unwrap_err();
        assert_eq!(err.code(), "IO");
    }
}
