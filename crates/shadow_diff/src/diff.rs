//! Structural diff engine.

use serde::{Deserialize, Serialize};
use shadow_core::{ShadowError, ShadowResult, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Default recursion ceiling for [`DiffEngine`]
pub const DEFAULT_MAX_DIFF_DEPTH: usize = 1000;

/// Kind of structural change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Runtime type differs
    TypeChanged,
    /// Scalar value differs
    ValueChanged,
    /// Key present only in current
    Added,
    /// Key present only in baseline
    Removed,
    /// Array lengths differ
    LengthChanged,
    /// Comparison semantics changed since the baseline was written
    #[serde(rename = "POLICY_DRIFT")]
    PolicyDrift,
}

impl ChangeType {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TypeChanged => "type_changed",
            Self::ValueChanged => "value_changed",
            Self::Added => "added",
            Self::Removed => "removed",
            Self::LengthChanged => "length_changed",
            Self::PolicyDrift => "POLICY_DRIFT",
        }
    }

    /// Severity assigned to this kind of change
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::TypeChanged | Self::Added | Self::Removed | Self::PolicyDrift => Severity::High,
            Self::ValueChanged | Self::LengthChanged => Severity::Medium,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Likely a regression
    Medium,
    /// Contract-breaking
    High,
}

impl Severity {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffChange {
    /// Location, rooted at `$`
    pub path: String,
    /// Kind of change
    pub change_type: ChangeType,
    /// Severity
    pub severity: Severity,
    /// Baseline side (absent for `Added`)
    pub baseline: Option<Value>,
    /// Current side (absent for `Removed`)
    pub current: Option<Value>,
    /// Baseline runtime type, for `TypeChanged`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_type: Option<String>,
    /// Current runtime type, for `TypeChanged`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_type: Option<String>,
}

impl DiffChange {
    /// Create a change with the default severity for its type
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        change_type: ChangeType,
        baseline: Option<Value>,
        current: Option<Value>,
    ) -> Self {
        Self {
            path: path.into(),
            change_type,
            severity: change_type.severity(),
            baseline,
            current,
            baseline_type: None,
            current_type: None,
        }
    }

    /// Whether this change is of the given type
    #[must_use]
    pub fn is(&self, change_type: ChangeType) -> bool {
        self.change_type == change_type
    }
}

/// Depth-first structural comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffEngine {
    max_depth: usize,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DIFF_DEPTH,
        }
    }
}

impl DiffEngine {
    /// Create an engine with the default ceiling
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with a custom ceiling
    #[must_use]
    pub const fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Configured ceiling
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Compare two values
    ///
    /// Changes are ordered depth-first: removed keys, added keys, then common
    /// keys recursively, all in sorted key order. Array element diffs come
    /// before the array's own `LengthChanged`.
    ///
    /// # Errors
    ///
    /// Returns `DiffTooDeep` when nesting exceeds the ceiling
    pub fn diff(&self, baseline: &Value, current: &Value) -> ShadowResult<Vec<DiffChange>> {
        let mut changes = Vec::new();
        self.walk(baseline, current, "$", 0, &mut changes)?;
        Ok(changes)
    }

    fn walk(
        &self,
        baseline: &Value,
        current: &Value,
        path: &str,
        depth: usize,
        out: &mut Vec<DiffChange>,
    ) -> ShadowResult<()> {
        if depth > self.max_depth {
            tracing::debug!(path, limit = self.max_depth, "diff depth ceiling reached");
            return Err(ShadowError::DiffTooDeep {
                path: path.to_string(),
                limit: self.max_depth,
            });
        }

        if !baseline.same_type(current) {
            let mut change = DiffChange::new(
                path,
                ChangeType::TypeChanged,
                Some(baseline.clone()),
                Some(current.clone()),
            );
            change.baseline_type = Some(baseline.type_name().to_string());
            change.current_type = Some(current.type_name().to_string());
            out.push(change);
            return Ok(());
        }

        match (baseline, current) {
            (Value::Object(before), Value::Object(after)) => {
                let before_keys: BTreeSet<&String> = before.keys().collect();
                let after_keys: BTreeSet<&String> = after.keys().collect();

                for key in before_keys.difference(&after_keys) {
                    out.push(DiffChange::new(
                        format!("{}.{}", path, key),
                        ChangeType::Removed,
                        before.get(*key).cloned(),
                        None,
                    ));
                }
                for key in after_keys.difference(&before_keys) {
                    out.push(DiffChange::new(
                        format!("{}.{}", path, key),
                        ChangeType::Added,
                        None,
                        after.get(*key).cloned(),
                    ));
                }
                for key in before_keys.intersection(&after_keys) {
                    if let (Some(b), Some(c)) = (before.get(*key), after.get(*key)) {
                        self.walk(b, c, &format!("{}.{}", path, key), depth + 1, out)?;
                    }
                }
            }
            (Value::Array(before), Value::Array(after)) => {
                for (idx, (b, c)) in before.iter().zip(after.iter()).enumerate() {
                    self.walk(b, c, &format!("{}[{}]", path, idx), depth + 1, out)?;
                }
                if before.len() != after.len() {
                    out.push(DiffChange::new(
                        path,
                        ChangeType::LengthChanged,
                        Some(Value::from(before.len())),
                        Some(Value::from(after.len())),
                    ));
                }
            }
            _ => {
                if baseline != current {
                    out.push(DiffChange::new(
                        path,
                        ChangeType::ValueChanged,
                        Some(baseline.clone()),
                        Some(current.clone()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Compare two values with the default ceiling
///
/// # Errors
///
/// Returns `DiffTooDeep` when nesting exceeds [`DEFAULT_MAX_DIFF_DEPTH`]
pub fn diff(baseline: &Value, current: &Value) -> ShadowResult<Vec<DiffChange>> {
    DiffEngine::default().diff(baseline, current)
}
