//! Single-scenario verification.
//!
//! Checks one freshly observed output against its baseline and hands back a
//! typed [`Regression`] instead of raising. The caller decides whether to
//! fail a test, log, or exit.

use shadow_core::ShadowError;
use shadow_diff::{explain_human, prepare, summarize, DiffChange, DiffEngine, DiffPolicy};
use shadow_governance::{
    baseline_file_name, load_record, BaselineRecord, CaptureOutput, CaptureScenario, LoadLimits,
    ScenarioKey, ScenarioStatus,
};
use std::path::Path;

/// A scenario whose output no longer matches its baseline
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Regression {
    /// Scenario key
    pub scenario_id: ScenarioKey,
    /// Structured changes, baseline to current
    pub changes: Vec<DiffChange>,
    /// Rendered report
    pub message: String,
    /// Command that approves the new behavior
    pub approve_hint: String,
}

impl Regression {
    fn new(scenario_id: ScenarioKey, changes: Vec<DiffChange>) -> Self {
        let approve_hint = format!(
            "sst approve {} {}",
            scenario_id.function_path(),
            scenario_id.fingerprint()
        );
        let structured = serde_json::to_string_pretty(&changes).unwrap_or_default();
        let message = format!(
            "\nREGRESSION DETECTED in {}\nSemantic ID: {}\nSummary:\n{}\n\nHuman-readable diff:\n{}\n\nStructured diff:\n{}\nTo approve this change, run: {}",
            scenario_id.function_path(),
            scenario_id.fingerprint(),
            summarize(&changes),
            explain_human(&changes),
            structured,
            approve_hint
        );
        Self {
            scenario_id,
            changes,
            message,
            approve_hint,
        }
    }
}

/// Failure of a verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Output differs from the baseline
    #[error(transparent)]
    Regression(Box<Regression>),
    /// The baseline could not be loaded or compared
    #[error(transparent)]
    Shadow(#[from] ShadowError),
}

impl VerifyError {
    /// The regression, if that is what failed
    #[must_use]
    pub fn regression(&self) -> Option<&Regression> {
        match self {
            Self::Regression(r) => Some(r),
            Self::Shadow(_) => None,
        }
    }
}

/// Compare one output with its baseline record
///
/// Deprecated baselines never produce a regression.
///
/// # Errors
///
/// Returns [`VerifyError::Regression`] when the outputs differ under the
/// policy
pub fn verify_against_baseline(
    record: &BaselineRecord,
    current: &CaptureOutput,
    policy: &DiffPolicy,
) -> Result<(), VerifyError> {
    if record.status() == ScenarioStatus::Deprecated {
        return Ok(());
    }
    let baseline = prepare(&record.scenario.output.comparable(), policy);
    let observed = prepare(&current.comparable(), policy);
    let changes = DiffEngine::default().diff(&baseline, &observed)?;
    if changes.is_empty() {
        return Ok(());
    }
    tracing::warn!(scenario = %record.key(), changes = changes.len(), "regression detected");
    Err(VerifyError::Regression(Box::new(Regression::new(record.key(), changes))))
}

/// Verify a scenario against the baseline file for its key under `dir`
///
/// A scenario without a baseline file passes.
///
/// # Errors
///
/// Returns [`VerifyError::Shadow`] when the baseline cannot be loaded and
/// [`VerifyError::Regression`] when the outputs differ
pub fn verify_scenario(
    dir: &Path,
    scenario: &CaptureScenario,
    policy: &DiffPolicy,
    limits: &LoadLimits,
) -> Result<(), VerifyError> {
    let path = dir.join(baseline_file_name(&scenario.key()));
    if !path.exists() {
        return Ok(());
    }
    let record = load_record(&path, limits)?;
    verify_against_baseline(&record, &scenario.output, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadow_core::{Map, Value};
    use shadow_governance::{Governor, RecordStore};
    use tempfile::TempDir;

    fn scenario(out: i64) -> CaptureScenario {
        let mut input = Map::new();
        input.insert("amount".to_string(), Value::Int(10));
        CaptureScenario::new("billing", "total", input, CaptureOutput::success(out))
    }

    #[test]
    fn test_matching_output_passes() {
        let record = Governor::default().create_from_capture(scenario(5));
        assert!(verify_against_baseline(&record, &CaptureOutput::success(5), &DiffPolicy::default()).is_ok());
    }

    #[test]
    fn test_changed_output_is_regression() {
        let record = Governor::default().create_from_capture(scenario(5));
        let err = verify_against_baseline(&record, &CaptureOutput::success(6), &DiffPolicy::default())
            .unwrap_err();
        let regression = err.regression().unwrap();
        assert_eq!(regression.scenario_id, record.key());
        assert_eq!(regression.changes.len(), 1);
        assert!(regression.message.contains("REGRESSION DETECTED in billing.total"));
        assert!(regression.message.contains(&format!(
            "To approve this change, run: sst approve billing.total {}",
            record.scenario.fingerprint
        )));
        assert_eq!(err.to_string(), regression.message);
    }

    #[test]
    fn test_deprecated_baseline_never_regresses() {
        let gov = Governor::default();
        let record = gov.deprecate(&gov.create_from_capture(scenario(5))).unwrap();
        assert!(verify_against_baseline(&record, &CaptureOutput::success(99), &DiffPolicy::default()).is_ok());
    }

    #[test]
    fn test_verify_scenario_from_store() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let policy = DiffPolicy::default();
        let limits = LoadLimits::default();

        assert!(verify_scenario(dir.path(), &scenario(1), &policy, &limits).is_ok());

        store.save(&Governor::default().create_from_capture(scenario(1))).unwrap();
        assert!(verify_scenario(dir.path(), &scenario(1), &policy, &limits).is_ok());
        let err = verify_scenario(dir.path(), &scenario(2), &policy, &limits).unwrap_err();
        assert!(err.regression().is_some());
    }

    #[test]
    fn test_corrupt_baseline_is_error_not_regression() {
        let dir = TempDir::new().unwrap();
        let s = scenario(1);
        std::fs::write(dir.path().join(baseline_file_name(&s.key())), "[1, 2]").unwrap();
        let err = verify_scenario(dir.path(), &s, &DiffPolicy::default(), &LoadLimits::default())
            .unwrap_err();
        match err {
            VerifyError::Shadow(e) => assert_eq!(e.code(), "BASELINE_FORMAT"),
            VerifyError::Regression(_) => panic!("expected a load error"),
        }
    }
}
