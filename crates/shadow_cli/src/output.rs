//! Terminal rendering.

use serde::Serialize;
use shadow_core::ShadowError;
use shadow_replay::{ReplayReport, ReplayScenarioResult};
use std::fmt::Write as _;

/// Errors raised by the command layer itself
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CliError {
    /// Verify was run without any baselines
    #[error("No baseline found in {dir}. Run 'sst record' first.")]
    NoBaseline {
        /// Baseline directory
        dir: String,
    },
    /// Approve target could not be parsed
    #[error("Expected <module.function:semantic_id> or <module.function> <semantic_id>, got '{0}'")]
    BadTarget(String),
}

/// Structured error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Stable code
    pub code: String,
    /// Error category
    pub category: String,
    /// Human message
    pub message: String,
}

/// Envelope printed for failed commands in JSON mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    /// Always false
    pub ok: bool,
    /// The error
    pub error: ErrorBody,
}

/// Map any failure onto a (category, code, message) triple
#[must_use]
pub fn classify(err: &anyhow::Error) -> ErrorBody {
    if let Some(e) = err.downcast_ref::<ShadowError>() {
        return ErrorBody {
            code: e.code().to_string(),
            category: e.category().as_str().to_string(),
            message: e.explanation(),
        };
    }
    if let Some(e) = err.downcast_ref::<CliError>() {
        let code = match e {
            CliError::NoBaseline { .. } => "NO_BASELINE",
            CliError::BadTarget(_) => "USAGE",
        };
        return ErrorBody {
            code: code.to_string(),
            category: "SYSTEM".to_string(),
            message: e.to_string(),
        };
    }
    ErrorBody {
        code: "INTERNAL".to_string(),
        category: "SYSTEM".to_string(),
        message: format!("{:#}", err),
    }
}

/// Render a failure for stdout
#[must_use]
pub fn render_error(err: &anyhow::Error, as_json: bool) -> String {
    let body = classify(err);
    if as_json {
        let envelope = ErrorEnvelope {
            ok: false,
            error: body,
        };
        return serde_json::to_string_pretty(&envelope).unwrap_or_default();
    }
    let prefix = if body.code == "INTERNAL" {
        "SST internal error"
    } else {
        "SST error"
    };
    format!("{} [{}:{}]: {}", prefix, body.category, body.code, body.message)
}

/// Human-readable verify report
#[must_use]
pub fn render_report(report: &ReplayReport, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SST Verification Report");
    let _ = writeln!(out, "-----------------------");
    let _ = writeln!(out, "Scenarios checked: {}", report.baseline_count);
    let _ = writeln!(out, "Regressions: {}", report.mismatch_count());
    let _ = writeln!(out);

    for warning in &report.warnings {
        let _ = writeln!(out, "WARN: {}", warning);
    }
    if !report.warnings.is_empty() {
        let _ = writeln!(out);
    }

    let mut rows: Vec<&ReplayScenarioResult> = report.scenarios.iter().collect();
    rows.sort_by(|a, b| a.scenario_id.cmp(&b.scenario_id));
    for row in rows {
        if !row.is_failed() {
            let _ = writeln!(out, "PASS: {}", row.scenario_id);
            continue;
        }
        let _ = writeln!(out, "FAIL: {}", row.scenario_id);
        let _ = writeln!(
            out,
            "Baseline version: {}",
            row.baseline_version.as_deref().unwrap_or("unknown")
        );
        let _ = writeln!(out, "Summary: {}", row.summary);
        if !row.human_diff.is_empty() {
            let _ = writeln!(out, "{}", row.human_diff);
        }
        if verbose && !row.changes.is_empty() {
            let _ = writeln!(
                out,
                "{}",
                serde_json::to_string_pretty(&row.changes).unwrap_or_default()
            );
        }
        let _ = writeln!(
            out,
            "To approve intentional changes:\n  sst approve {}",
            row.scenario_id
        );
        let _ = writeln!(out);
    }
    out
}

/// Pretty JSON with sorted keys and a trailing newline
#[must_use]
pub fn pretty_json(value: &serde_json::Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_default();
    text.push('\n');
    text
}
