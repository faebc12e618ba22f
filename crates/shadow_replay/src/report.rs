//! Replay reports.
//!
//! A missing capture appears twice on purpose: its key is listed in
//! `missing` and it has a failed row in `scenarios`. It is not listed in
//! `regressions`, which holds only value and policy drift failures.
//! [`ReplayReport::mismatch_count`] counts failed rows, so each missing key
//! is counted once.

use serde::{Deserialize, Serialize};
use shadow_core::Clock;
use shadow_diff::DiffChange;
use shadow_governance::ScenarioKey;

/// Outcome of one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStatus {
    /// No semantic differences
    Passed,
    /// Regression, drift, or missing capture
    Failed,
}

impl ReplayStatus {
    /// Short form used in CI output
    #[must_use]
    pub const fn ci_label(&self) -> &'static str {
        match self {
            Self::Passed => "pass",
            Self::Failed => "fail",
        }
    }
}

/// One row of a replay report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayScenarioResult {
    /// Scenario key
    pub scenario_id: ScenarioKey,
    /// Outcome
    pub status: ReplayStatus,
    /// One-line summary
    pub summary: String,
    /// Multi-line explanation
    pub human_diff: String,
    /// Structured changes
    pub changes: Vec<DiffChange>,
    /// Baseline version compared against
    pub baseline_version: Option<String>,
    /// Advisory warnings for this scenario
    pub warnings: Vec<String>,
}

impl ReplayScenarioResult {
    /// Whether the row failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == ReplayStatus::Failed
    }
}

/// Result of reconciling a baseline set against a capture set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Failed rows caused by value differences or policy drift
    pub regressions: Vec<ReplayScenarioResult>,
    /// Baseline keys without a capture
    pub missing: Vec<ScenarioKey>,
    /// Every baseline row in key order
    pub scenarios: Vec<ReplayScenarioResult>,
    /// Baselines considered
    pub baseline_count: usize,
    /// Captures loaded
    pub capture_count: usize,
    /// Warnings prefixed with their scenario key
    pub warnings: Vec<String>,
}

impl ReplayReport {
    /// Failed rows in `scenarios`
    #[must_use]
    pub fn mismatch_count(&self) -> usize {
        self.scenarios.iter().filter(|row| row.is_failed()).count()
    }

    /// Whether every scenario passed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatch_count() == 0
    }

    /// Process exit code for a completed replay: 0 clean, 1 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_clean())
    }

    /// Row for a key
    #[must_use]
    pub fn scenario(&self, key: &ScenarioKey) -> Option<&ReplayScenarioResult> {
        self.scenarios.iter().find(|row| &row.scenario_id == key)
    }

    /// Projection for CI consumers
    #[must_use]
    pub fn ci_report(&self, clock: &dyn Clock, engine_version: &str) -> CiReport {
        let mut rows: Vec<&ReplayScenarioResult> = self.scenarios.iter().collect();
        rows.sort_by(|a, b| a.scenario_id.cmp(&b.scenario_id));
        let scenarios: Vec<CiScenario> = rows
            .into_iter()
            .map(|row| CiScenario {
                scenario_id: row.scenario_id.clone(),
                status: row.status.ci_label().to_string(),
                diff_summary: if row.is_failed() {
                    row.summary.clone()
                } else {
                    String::new()
                },
                diff: row.changes.clone(),
                baseline_version: row.baseline_version.clone(),
            })
            .collect();

        let mismatch_count = scenarios.iter().filter(|s| s.status == "fail").count();
        CiReport {
            summary: CiSummary {
                timestamp: clock.now_iso(),
                engine_version: engine_version.to_string(),
                baseline_count: self.baseline_count,
                capture_count: self.capture_count,
                mismatch_count,
                warning_count: self.warnings.len(),
            },
            warnings: self.warnings.clone(),
            scenarios,
            exit_code: i32::from(mismatch_count > 0),
        }
    }
}

/// Machine-readable verify report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiReport {
    /// Counts and run metadata
    pub summary: CiSummary,
    /// Warnings prefixed with their scenario key
    pub warnings: Vec<String>,
    /// One row per scenario, sorted by key
    pub scenarios: Vec<CiScenario>,
    /// 0 clean, 1 mismatches
    pub exit_code: i32,
}

/// Header of a [`CiReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiSummary {
    /// Report time
    pub timestamp: String,
    /// Engine that produced the report
    pub engine_version: String,
    /// Baselines considered
    pub baseline_count: usize,
    /// Captures loaded
    pub capture_count: usize,
    /// Failed scenarios
    pub mismatch_count: usize,
    /// Warnings emitted
    pub warning_count: usize,
}

/// One scenario of a [`CiReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiScenario {
    /// Scenario key
    pub scenario_id: ScenarioKey,
    /// `pass` or `fail`
    pub status: String,
    /// Summary of a failure, empty on pass
    pub diff_summary: String,
    /// Structured changes
    pub diff: Vec<DiffChange>,
    /// Baseline version compared against
    pub baseline_version: Option<String>,
}
