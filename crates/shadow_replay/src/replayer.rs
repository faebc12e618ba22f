//! Directory-backed replay.

use crate::loader::{BaselineSet, CaptureSet};
use crate::matcher::Matcher;
use crate::report::ReplayReport;
use shadow_core::{ShadowResult, ENGINE_VERSION};
use shadow_diff::DiffPolicy;
use shadow_governance::{GovernancePolicy, LoadLimits};
use std::path::{Path, PathBuf};

/// Replays a capture directory against a baseline directory
///
/// Loading happens in full before any comparison; a corrupt, oversized or
/// duplicate file fails the whole run.
#[derive(Debug, Clone)]
pub struct Replayer {
    baseline_dir: PathBuf,
    capture_dir: PathBuf,
    diff_policy: DiffPolicy,
    governance_policy: GovernancePolicy,
    limits: LoadLimits,
    engine_version: String,
}

impl Replayer {
    /// Replayer with default policies and limits
    #[must_use]
    pub fn new(baseline_dir: impl Into<PathBuf>, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            baseline_dir: baseline_dir.into(),
            capture_dir: capture_dir.into(),
            diff_policy: DiffPolicy::default(),
            governance_policy: GovernancePolicy::default(),
            limits: LoadLimits::default(),
            engine_version: ENGINE_VERSION.to_string(),
        }
    }

    /// Set the diff policy
    #[must_use]
    pub fn with_diff_policy(mut self, policy: DiffPolicy) -> Self {
        self.diff_policy = policy;
        self
    }

    /// Set the governance policy
    #[must_use]
    pub fn with_governance_policy(mut self, policy: GovernancePolicy) -> Self {
        self.governance_policy = policy;
        self
    }

    /// Set load limits
    #[must_use]
    pub fn with_limits(mut self, limits: LoadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Engine version recorded baselines are compared against
    #[must_use]
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }

    /// Baseline directory
    #[must_use]
    pub fn baseline_dir(&self) -> &Path {
        &self.baseline_dir
    }

    /// Capture directory
    #[must_use]
    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    /// Load both directories and reconcile them
    ///
    /// # Errors
    ///
    /// Load-phase errors propagate unmodified: baseline format and
    /// validation errors, `ReplayExecution` for corrupt captures or
    /// duplicate baselines, `ReplayDeterminism` for duplicate captures
    pub fn replay(&self) -> ShadowResult<ReplayReport> {
        let baselines = BaselineSet::load(&self.baseline_dir, &self.limits)?;
        let captures = CaptureSet::load(&self.capture_dir, &self.limits)?;
        Matcher::new(&self.diff_policy, &self.governance_policy)
            .with_engine_version(self.engine_version.clone())
            .run(&baselines, &captures)
    }
}
