//! Error taxonomy for SHADOW.TEST.
//!
//! Every failure carries a stable machine-checkable code, a category, and a
//! human explanation. Load and validation failures are fatal; semantic
//! differences between scenarios are reported as data, never as errors.

use std::fmt;

/// Shared result type
pub type ShadowResult<T> = Result<T, ShadowError>;

/// Error category (the first half of `CATEGORY:CODE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCategory {
    /// Baseline and capture record files
    Baseline,
    /// Diff policy and comparison
    Diff,
    /// Replay loading and matching
    Replay,
    /// Governance lifecycle
    Governance,
    /// Host environment (filesystem)
    System,
}

impl ErrorCategory {
    /// Upper-case label used in rendered errors
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "BASELINE",
            Self::Diff => "DIFF",
            Self::Replay => "REPLAY",
            Self::Governance => "GOVERNANCE",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shadow error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShadowError {
    /// Malformed, oversized, or unsupported-version record file
    #[error("[BASELINE:BASELINE_FORMAT] {explanation}")]
    BaselineFormat {
        /// Human explanation
        explanation: String,
    },

    /// Missing or mistyped required field
    #[error("[BASELINE:BASELINE_VALIDATION] {explanation}")]
    BaselineValidation {
        /// Human explanation
        explanation: String,
    },

    /// No baseline file holds the requested scenario
    #[error("[BASELINE:SCENARIO_NOT_FOUND] {explanation}")]
    ScenarioNotFound {
        /// Human explanation
        explanation: String,
    },

    /// Invalid diff policy
    #[error("[DIFF:DIFF_CONTRACT] {explanation}")]
    DiffContract {
        /// Human explanation
        explanation: String,
    },

    /// Structural diff exceeded its recursion ceiling
    #[error("[DIFF:DIFF_TOO_DEEP] Maximum diff depth exceeded at {path} (limit {limit})")]
    DiffTooDeep {
        /// Path where the ceiling was crossed
        path: String,
        /// Configured ceiling
        limit: usize,
    },

    /// Corrupt capture file or ambiguous baseline set
    #[error("[REPLAY:REPLAY_EXECUTION] {explanation}")]
    ReplayExecution {
        /// Human explanation
        explanation: String,
    },

    /// Same scenario key captured twice in one run
    #[error("[REPLAY:REPLAY_NON_DETERMINISTIC] {explanation}")]
    ReplayDeterminism {
        /// Human explanation
        explanation: String,
    },

    /// Unknown policy or disallowed transition
    #[error("[GOVERNANCE:GOVERNANCE_POLICY] {explanation}")]
    GovernancePolicy {
        /// Human explanation
        explanation: String,
    },

    /// Filesystem failure
    #[error("[SYSTEM:IO] {path}: {reason}")]
    Io {
        /// Path involved
        path: String,
        /// OS error text
        reason: String,
    },
}

impl ShadowError {
    /// Build a `BaselineFormat` error
    pub fn baseline_format(explanation: impl Into<String>) -> Self {
        Self::BaselineFormat {
            explanation: explanation.into(),
        }
    }

    /// Build a `BaselineValidation` error
    pub fn baseline_validation(explanation: impl Into<String>) -> Self {
        Self::BaselineValidation {
            explanation: explanation.into(),
        }
    }

    /// Build a `ScenarioNotFound` error
    pub fn scenario_not_found(explanation: impl Into<String>) -> Self {
        Self::ScenarioNotFound {
            explanation: explanation.into(),
        }
    }

    /// Build a `DiffContract` error
    pub fn diff_contract(explanation: impl Into<String>) -> Self {
        Self::DiffContract {
            explanation: explanation.into(),
        }
    }

    /// Build a `ReplayExecution` error
    pub fn replay_execution(explanation: impl Into<String>) -> Self {
        Self::ReplayExecution {
            explanation: explanation.into(),
        }
    }

    /// Build a `ReplayDeterminism` error
    pub fn replay_determinism(explanation: impl Into<String>) -> Self {
        Self::ReplayDeterminism {
            explanation: explanation.into(),
        }
    }

    /// Build a `GovernancePolicy` error
    pub fn governance_policy(explanation: impl Into<String>) -> Self {
        Self::GovernancePolicy {
            explanation: explanation.into(),
        }
    }

    /// Build an `Io` error from a path and an OS error
    pub fn io(path: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }

    /// Error category
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::BaselineFormat { .. }
            | Self::BaselineValidation { .. }
            | Self::ScenarioNotFound { .. } => ErrorCategory::Baseline,
            Self::DiffContract { .. } | Self::DiffTooDeep { .. } => ErrorCategory::Diff,
            Self::ReplayExecution { .. } | Self::ReplayDeterminism { .. } => ErrorCategory::Replay,
            Self::GovernancePolicy { .. } => ErrorCategory::Governance,
            Self::Io { .. } => ErrorCategory::System,
        }
    }

    /// Stable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BaselineFormat { .. } => "BASELINE_FORMAT",
            Self::BaselineValidation { .. } => "BASELINE_VALIDATION",
            Self::ScenarioNotFound { .. } => "SCENARIO_NOT_FOUND",
            Self::DiffContract { .. } => "DIFF_CONTRACT",
            Self::DiffTooDeep { .. } => "DIFF_TOO_DEEP",
            Self::ReplayExecution { .. } => "REPLAY_EXECUTION",
            Self::ReplayDeterminism { .. } => "REPLAY_NON_DETERMINISTIC",
            Self::GovernancePolicy { .. } => "GOVERNANCE_POLICY",
            Self::Io { .. } => "IO",
        }
    }

    /// Human explanation without the `[CATEGORY:CODE]` prefix
    #[must_use]
    pub fn explanation(&self) -> String {
        match self {
            Self::BaselineFormat { explanation }
            | Self::BaselineValidation { explanation }
            | Self::ScenarioNotFound { explanation }
            | Self::DiffContract { explanation }
            | Self::ReplayExecution { explanation }
            | Self::ReplayDeterminism { explanation }
            | Self::GovernancePolicy { explanation } => explanation.clone(),
            Self::DiffTooDeep { path, limit } => {
                format!("Maximum diff depth exceeded at {} (limit {})", path, limit)
            }
            Self::Io { path, reason } => format!("{}: {}", path, reason),
        }
    }
}
