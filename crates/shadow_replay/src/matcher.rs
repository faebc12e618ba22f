//! Replay matcher.
//!
//! Reconciles a baseline set against a capture set. Load-phase failures are
//! the caller's concern; once both sets are in memory every semantic
//! difference becomes a report row, never an error. Policy snapshots are
//! taken once when the [`Matcher`] is built so a run observes a single view
//! of policy.

use crate::loader::{BaselineSet, CaptureSet};
use crate::report::{ReplayReport, ReplayScenarioResult, ReplayStatus};
use shadow_core::{Map, PolicySnapshot, ShadowResult, Value, ENGINE_VERSION};
use shadow_diff::{
    explain_human, prepare, summarize, ChangeType, DiffChange, DiffEngine, DiffPolicy,
};
use shadow_governance::{BaselineRecord, CaptureScenario, GovernancePolicy};

/// Summary of a baseline with no capture
pub const MISSING_CAPTURE_SUMMARY: &str = "Scenario missing from replay capture.";

/// Explanation of a baseline with no capture
pub const MISSING_CAPTURE_HUMAN: &str = "No replay output captured for baseline scenario.";

/// Summary of a scenario with no differences
pub const PASSED_SUMMARY: &str = "No semantic differences detected.";

/// Prefix of drift messages that fail a scenario
pub const POLICY_DRIFT_PREFIX: &str = "POLICY_DRIFT";

/// Path of the synthetic drift change
const DRIFT_PATH: &str = "$.metadata";

/// Compares baselines with captures under fixed policies
#[derive(Debug, Clone)]
pub struct Matcher {
    diff_policy: DiffPolicy,
    diff_engine: DiffEngine,
    diff_snapshot: PolicySnapshot,
    governance_snapshot: PolicySnapshot,
    engine_version: String,
}

impl Matcher {
    /// Snapshot both policies for one run
    #[must_use]
    pub fn new(diff_policy: &DiffPolicy, governance_policy: &GovernancePolicy) -> Self {
        Self {
            diff_policy: diff_policy.clone(),
            diff_engine: DiffEngine::default(),
            diff_snapshot: diff_policy.snapshot(),
            governance_snapshot: governance_policy.snapshot(),
            engine_version: ENGINE_VERSION.to_string(),
        }
    }

    /// Compare recorded engine versions against this version
    #[must_use]
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    /// Replace the diff engine
    #[must_use]
    pub fn with_diff_engine(mut self, engine: DiffEngine) -> Self {
        self.diff_engine = engine;
        self
    }

    /// Reconcile the two sets
    ///
    /// # Errors
    ///
    /// Returns `DiffTooDeep` only if a custom diff engine has a ceiling below
    /// the normalization depth bound
    pub fn run(&self, baselines: &BaselineSet, captures: &CaptureSet) -> ShadowResult<ReplayReport> {
        let mut report = ReplayReport {
            baseline_count: baselines.len(),
            capture_count: captures.len(),
            ..ReplayReport::default()
        };

        for (key, baseline) in baselines.iter() {
            let baseline_version = Some(baseline.metadata.version_id.clone());

            let mut row_warnings = Vec::new();
            if let Some(warning) = self.engine_version_warning(&baseline.scenario) {
                tracing::warn!(scenario = %key, "{}", warning);
                report.warnings.push(format!("{}: {}", key, warning));
                row_warnings.push(warning);
            }

            let drift = self.drift_messages(baseline);
            for message in &drift {
                report.warnings.push(format!("{}: {}", key, message));
            }
            if drift.iter().any(|m| m.starts_with(POLICY_DRIFT_PREFIX)) {
                tracing::warn!(scenario = %key, "policy drift detected");
                let row = ReplayScenarioResult {
                    scenario_id: key.clone(),
                    status: ReplayStatus::Failed,
                    summary: drift.join("; "),
                    human_diff: drift.join("\n"),
                    changes: vec![self.drift_change(baseline)],
                    baseline_version,
                    warnings: row_warnings,
                };
                report.regressions.push(row.clone());
                report.scenarios.push(row);
                continue;
            }

            let Some(capture) = captures.get(key) else {
                report.missing.push(key.clone());
                report.scenarios.push(ReplayScenarioResult {
                    scenario_id: key.clone(),
                    status: ReplayStatus::Failed,
                    summary: MISSING_CAPTURE_SUMMARY.to_string(),
                    human_diff: MISSING_CAPTURE_HUMAN.to_string(),
                    changes: Vec::new(),
                    baseline_version,
                    warnings: row_warnings,
                });
                continue;
            };

            let changes = self.compare(&baseline.scenario, &capture.scenario)?;
            if changes.is_empty() {
                report.scenarios.push(ReplayScenarioResult {
                    scenario_id: key.clone(),
                    status: ReplayStatus::Passed,
                    summary: PASSED_SUMMARY.to_string(),
                    human_diff: String::new(),
                    changes,
                    baseline_version,
                    warnings: row_warnings,
                });
            } else {
                let row = ReplayScenarioResult {
                    scenario_id: key.clone(),
                    status: ReplayStatus::Failed,
                    summary: summarize(&changes),
                    human_diff: explain_human(&changes),
                    changes,
                    baseline_version,
                    warnings: row_warnings,
                };
                report.regressions.push(row.clone());
                report.scenarios.push(row);
            }
        }

        tracing::debug!(
            baselines = report.baseline_count,
            captures = report.capture_count,
            regressions = report.regressions.len(),
            missing = report.missing.len(),
            "replay finished"
        );
        Ok(report)
    }

    /// Diff two scenario outputs after policy filtering and normalization
    ///
    /// # Errors
    ///
    /// See [`Matcher::run`]
    pub fn compare(
        &self,
        baseline: &CaptureScenario,
        current: &CaptureScenario,
    ) -> ShadowResult<Vec<DiffChange>> {
        let b = prepare(&baseline.output.comparable(), &self.diff_policy);
        let c = prepare(&current.output.comparable(), &self.diff_policy);
        self.diff_engine.diff(&b, &c)
    }

    /// Advisory for a baseline recorded by another engine version
    #[must_use]
    pub fn engine_version_warning(&self, scenario: &CaptureScenario) -> Option<String> {
        match scenario.engine_version.as_deref() {
            None | Some("") => Some(format!(
                "Baseline missing engine_version metadata, potential reinterpretation risk (current v{}).",
                self.engine_version
            )),
            Some(recorded) if recorded != self.engine_version => Some(format!(
                "Baseline captured with v{}, current v{}; potential reinterpretation risk.",
                recorded, self.engine_version
            )),
            Some(_) => None,
        }
    }

    /// Drift findings for a baseline; entries starting with
    /// [`POLICY_DRIFT_PREFIX`] fail the scenario, the rest are advisory
    #[must_use]
    pub fn drift_messages(&self, record: &BaselineRecord) -> Vec<String> {
        let mut messages = Vec::new();

        match &record.metadata.diff_policy_snapshot {
            None => messages.push(
                "Baseline missing diff_policy_snapshot metadata, policy drift cannot be proven."
                    .to_string(),
            ),
            Some(stored) if !stored.verify() => messages.push(format!(
                "{}: DiffPolicy snapshot failed its integrity check; stored hash does not match its contents.",
                POLICY_DRIFT_PREFIX
            )),
            Some(stored) => {
                let recorded = semantics_version(stored);
                let current = semantics_version(&self.diff_snapshot);
                if recorded < current {
                    messages.push(format!(
                        "{}: DiffPolicy semantics_version advanced from {} to {}; normalization semantics may differ.",
                        POLICY_DRIFT_PREFIX, recorded, current
                    ));
                } else if stored.hash() != self.diff_snapshot.hash() {
                    messages.push(format!(
                        "{}: DiffPolicy snapshot mismatch between baseline and current runtime policy.",
                        POLICY_DRIFT_PREFIX
                    ));
                }
            }
        }

        match &record.metadata.governance_policy_snapshot {
            None => messages.push(
                "Baseline missing governance_policy_snapshot metadata, governance drift cannot be proven."
                    .to_string(),
            ),
            Some(stored) if !stored.verify() => messages.push(format!(
                "{}: GovernancePolicy snapshot failed its integrity check; stored hash does not match its contents.",
                POLICY_DRIFT_PREFIX
            )),
            Some(stored) if stored.hash() != self.governance_snapshot.hash() => {
                messages.push(format!(
                    "{}: GovernancePolicy snapshot mismatch between baseline and runtime.",
                    POLICY_DRIFT_PREFIX
                ));
            }
            Some(_) => {}
        }

        messages
    }

    fn drift_change(&self, record: &BaselineRecord) -> DiffChange {
        let mut current = Map::new();
        current.insert(
            "diff_policy_snapshot".to_string(),
            self.diff_snapshot.as_value().clone(),
        );
        current.insert(
            "governance_policy_snapshot".to_string(),
            self.governance_snapshot.as_value().clone(),
        );
        DiffChange::new(
            DRIFT_PATH,
            ChangeType::PolicyDrift,
            Some(record.metadata.to_value()),
            Some(Value::Object(current)),
        )
    }
}

fn semantics_version(snapshot: &PolicySnapshot) -> i64 {
    snapshot
        .semantics_version()
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Reconcile a baseline set against a capture set under the given policies
///
/// # Errors
///
/// See [`Matcher::run`]
pub fn replay(
    baselines: &BaselineSet,
    captures: &CaptureSet,
    diff_policy: &DiffPolicy,
    governance_policy: &GovernancePolicy,
) -> ShadowResult<ReplayReport> {
    Matcher::new(diff_policy, governance_policy).run(baselines, captures)
}
