//! Diff policy.
//!
//! A declarative, auditable description of which fields are suppressed and
//! how values are normalized before comparison. Policies are immutable values
//! passed into every call; changing policy means building a new one.

use serde::{Deserialize, Serialize};
use shadow_core::{Map, PolicySnapshot, ShadowError, ShadowResult, Value};
use std::collections::BTreeSet;

/// Policy id of the built-in policy
pub const DEFAULT_POLICY_ID: &str = "default-v1";

/// Semantics version of the diff rules implemented here
pub const DIFF_SEMANTICS_VERSION: i64 = 1;

/// Default float tolerance
pub const DEFAULT_FLOAT_TOLERANCE: f64 = 1e-6;

/// Fields suppressed by the built-in policy
pub const DEFAULT_IGNORED_FIELDS: &[&str] = &[
    "timestamp",
    "transaction_id",
    "id",
    "uuid",
    "duration",
    "created_at",
    "approved_at",
];

/// Upper bound on rounding precision
const MAX_DECIMALS: i32 = 12;

/// Diff policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffPolicy {
    /// Policy identifier
    pub policy_id: String,
    /// Version of the comparison semantics
    pub semantics_version: i64,
    /// Field names dropped anywhere in a payload (lower-case)
    pub ignored_fields: BTreeSet<String>,
    /// Paths dropped from a payload (`$.a.b`, `a.b`, `$.items[0]`)
    pub ignored_paths: BTreeSet<String>,
    /// Paths of arrays compared as unordered
    pub list_sort_paths: BTreeSet<String>,
    /// Float tolerance; zero disables rounding
    pub float_tolerance: f64,
    /// Replace ISO-8601 timestamps with `<timestamp>`
    pub mask_timestamps: bool,
    /// Replace UUID strings with `<uuid>`
    pub mask_uuid_like: bool,
    /// Collapse whitespace runs in strings
    #[serde(rename = "normalize_string_whitespace", alias = "normalize_whitespace")]
    pub normalize_whitespace: bool,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            policy_id: DEFAULT_POLICY_ID.to_string(),
            semantics_version: DIFF_SEMANTICS_VERSION,
            ignored_fields: DEFAULT_IGNORED_FIELDS.iter().map(|f| (*f).to_string()).collect(),
            ignored_paths: BTreeSet::new(),
            list_sort_paths: BTreeSet::new(),
            float_tolerance: DEFAULT_FLOAT_TOLERANCE,
            mask_timestamps: true,
            mask_uuid_like: false,
            normalize_whitespace: true,
        }
    }
}

impl DiffPolicy {
    /// Create a policy with no suppression and default normalization
    #[must_use]
    pub fn new(policy_id: impl Into<String>, semantics_version: i64) -> Self {
        Self {
            policy_id: policy_id.into(),
            semantics_version,
            ignored_fields: BTreeSet::new(),
            ..Self::default()
        }
    }

    /// Replace the ignored field set (names are lower-cased)
    #[must_use]
    pub fn with_ignored_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored_fields = fields
            .into_iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        self
    }

    /// Replace the ignored path set
    #[must_use]
    pub fn with_ignored_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored_paths = clean_paths(paths);
        self
    }

    /// Replace the unordered-list path set
    #[must_use]
    pub fn with_list_sort_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.list_sort_paths = clean_paths(paths);
        self
    }

    /// Set the float tolerance
    #[must_use]
    pub fn with_float_tolerance(mut self, tolerance: f64) -> Self {
        self.float_tolerance = tolerance;
        self
    }

    /// Toggle timestamp masking
    #[must_use]
    pub fn with_mask_timestamps(mut self, enabled: bool) -> Self {
        self.mask_timestamps = enabled;
        self
    }

    /// Toggle UUID masking
    #[must_use]
    pub fn with_mask_uuid_like(mut self, enabled: bool) -> Self {
        self.mask_uuid_like = enabled;
        self
    }

    /// Toggle whitespace collapsing
    #[must_use]
    pub fn with_normalize_whitespace(mut self, enabled: bool) -> Self {
        self.normalize_whitespace = enabled;
        self
    }

    /// Check the policy contract
    ///
    /// # Errors
    ///
    /// Returns `DiffContract` for an empty id, a negative semantics version,
    /// or a negative or non-finite tolerance
    pub fn validate(&self) -> ShadowResult<()> {
        if self.policy_id.trim().is_empty() {
            return Err(ShadowError::diff_contract("Diff policy policy_id must be non-empty"));
        }
        if self.semantics_version < 0 {
            return Err(ShadowError::diff_contract(format!(
                "Diff policy semantics_version must be non-negative, got {}",
                self.semantics_version
            )));
        }
        if !self.float_tolerance.is_finite() || self.float_tolerance < 0.0 {
            return Err(ShadowError::diff_contract(format!(
                "Diff policy float_tolerance must be a finite non-negative number, got {}",
                self.float_tolerance
            )));
        }
        Ok(())
    }

    /// Build a policy from a loosely typed value
    ///
    /// Missing members take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `DiffContract` when a member has the wrong type, notably a
    /// non-integer `semantics_version`, or when the result fails [`validate`]
    ///
    /// [`validate`]: DiffPolicy::validate
    pub fn from_value(value: &Value) -> ShadowResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ShadowError::diff_contract("Diff policy must be an object"))?;
        let mut policy = Self::default();

        if let Some(id) = obj.get("policy_id") {
            policy.policy_id = id
                .as_str()
                .ok_or_else(|| ShadowError::diff_contract("Diff policy policy_id must be a string"))?
                .to_string();
        }
        if let Some(version) = obj.get("semantics_version") {
            policy.semantics_version = version.as_i64().ok_or_else(|| {
                ShadowError::diff_contract("Diff policy semantics_version must be an integer")
            })?;
        }
        if let Some(fields) = obj.get("ignored_fields") {
            policy = policy.with_ignored_fields(string_list(fields, "ignored_fields")?);
        }
        if let Some(paths) = obj.get("ignored_paths") {
            policy = policy.with_ignored_paths(string_list(paths, "ignored_paths")?);
        }
        if let Some(paths) = obj.get("list_sort_paths") {
            policy = policy.with_list_sort_paths(string_list(paths, "list_sort_paths")?);
        }
        if let Some(tol) = obj.get("float_tolerance") {
            policy.float_tolerance = match tol {
                Value::Int(i) => *i as f64,
                Value::Float(f) => *f,
                _ => {
                    return Err(ShadowError::diff_contract(
                        "Diff policy float_tolerance must be a number",
                    ));
                }
            };
        }
        policy.mask_timestamps = bool_member(obj, "mask_timestamps", policy.mask_timestamps)?;
        policy.mask_uuid_like = bool_member(obj, "mask_uuid_like", policy.mask_uuid_like)?;
        policy.normalize_whitespace = bool_member(
            obj,
            "normalize_string_whitespace",
            bool_member(obj, "normalize_whitespace", policy.normalize_whitespace)?,
        )?;

        policy.validate()?;
        Ok(policy)
    }

    /// Rounding precision derived from the tolerance; `None` disables rounding
    #[must_use]
    pub fn decimals(&self) -> Option<u32> {
        if self.float_tolerance == 0.0 {
            return None;
        }
        if self.float_tolerance < 0.0 || !self.float_tolerance.is_finite() {
            return Some(6);
        }
        let exp = (-self.float_tolerance.log10()).round() as i32;
        Some(exp.clamp(0, MAX_DECIMALS) as u32)
    }

    /// Whether a field name is suppressed
    #[must_use]
    pub fn ignores_field(&self, name: &str) -> bool {
        self.ignored_fields.contains(&name.to_lowercase())
    }

    /// Whether a path is suppressed
    #[must_use]
    pub fn ignores_path(&self, path: &str) -> bool {
        path_in(&self.ignored_paths, path)
    }

    /// Whether the array at a path is compared as unordered
    #[must_use]
    pub fn sorts_list_at(&self, path: &str) -> bool {
        path_in(&self.list_sort_paths, path)
    }

    /// Content-addressed snapshot for record metadata
    #[must_use]
    pub fn snapshot(&self) -> PolicySnapshot {
        let strings = |set: &BTreeSet<String>| {
            Value::Array(set.iter().map(|s| Value::from(s.as_str())).collect())
        };
        let mut config = Map::new();
        config.insert("ignored_fields".to_string(), strings(&self.ignored_fields));
        config.insert("ignored_paths".to_string(), strings(&self.ignored_paths));
        config.insert("list_sort_paths".to_string(), strings(&self.list_sort_paths));
        config.insert("float_tolerance".to_string(), Value::Float(self.float_tolerance));
        config.insert("mask_timestamps".to_string(), Value::Bool(self.mask_timestamps));
        config.insert("mask_uuid_like".to_string(), Value::Bool(self.mask_uuid_like));
        config.insert(
            "normalize_string_whitespace".to_string(),
            Value::Bool(self.normalize_whitespace),
        );

        let mut payload = Map::new();
        payload.insert("policy_id".to_string(), Value::from(self.policy_id.as_str()));
        payload.insert("semantics_version".to_string(), Value::Int(self.semantics_version));
        payload.insert("config".to_string(), Value::Object(config));
        PolicySnapshot::seal(payload)
    }
}

/// Path set membership, accepting entries written with or without the `$` root
pub(crate) fn path_in(set: &BTreeSet<String>, path: &str) -> bool {
    if set.is_empty() {
        return false;
    }
    if set.contains(path) {
        return true;
    }
    if let Some(rest) = path.strip_prefix("$.") {
        if set.contains(rest) {
            return true;
        }
    }
    path.strip_prefix('$').is_some_and(|rest| set.contains(rest))
}

fn clean_paths<I, S>(paths: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn string_list(value: &Value, member: &str) -> ShadowResult<Vec<String>> {
    let items = value.as_array().ok_or_else(|| {
        ShadowError::diff_contract(format!("Diff policy {} must be a list of strings", member))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                ShadowError::diff_contract(format!("Diff policy {} must be a list of strings", member))
            })
        })
        .collect()
}

fn bool_member(obj: &Map, member: &str, default: bool) -> ShadowResult<bool> {
    match obj.get(member) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ShadowError::diff_contract(format!(
            "Diff policy {} must be a boolean",
            member
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_policy() {
        let policy = DiffPolicy::default();
        assert_eq!(policy.policy_id, "default-v1");
        assert_eq!(policy.semantics_version, 1);
        assert!(policy.ignores_field("Timestamp"));
        assert!(policy.ignores_field("ID"));
        assert!(!policy.ignores_field("value"));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_decimals_from_tolerance() {
        let policy = DiffPolicy::default();
        assert_eq!(policy.decimals(), Some(6));
        assert_eq!(policy.clone().with_float_tolerance(0.01).decimals(), Some(2));
        assert_eq!(policy.clone().with_float_tolerance(0.0).decimals(), None);
        assert_eq!(policy.clone().with_float_tolerance(1e-30).decimals(), Some(12));
        assert_eq!(policy.clone().with_float_tolerance(1.0).decimals(), Some(0));
        assert_eq!(policy.with_float_tolerance(100.0).decimals(), Some(0));
    }

    #[test]
    fn test_path_matching_accepts_short_forms() {
        let policy = DiffPolicy::default().with_ignored_paths(["meta.trace", "$.a.b", " ", "[0]"]);
        assert!(policy.ignores_path("$.meta.trace"));
        assert!(policy.ignores_path("$.a.b"));
        assert!(policy.ignores_path("$[0]"));
        assert!(!policy.ignores_path("$.meta"));
        assert_eq!(policy.ignored_paths.len(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_tolerance() {
        let err = DiffPolicy::default().with_float_tolerance(-1.0).validate().unwrap_err();
        assert_eq!(err.code(), "DIFF_CONTRACT");
        assert!(DiffPolicy::default().with_float_tolerance(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_from_value_rejects_non_integer_semantics_version() {
        let value = Value::from(json!({"policy_id": "p", "semantics_version": "1"}));
        let err = DiffPolicy::from_value(&value).unwrap_err();
        assert_eq!(err.code(), "DIFF_CONTRACT");
        assert!(err.explanation().contains("semantics_version must be an integer"));

        let value = Value::from(json!({"semantics_version": 1.5}));
        assert!(DiffPolicy::from_value(&value).is_err());
    }

    #[test]
    fn test_from_value_reads_members() {
        let value = Value::from(json!({
            "policy_id": "custom",
            "semantics_version": 2,
            "ignored_fields": ["Session"],
            "list_sort_paths": ["$.tags"],
            "float_tolerance": 0.001,
            "mask_uuid_like": true,
            "normalize_string_whitespace": false
        }));
        let policy = DiffPolicy::from_value(&value).unwrap();
        assert_eq!(policy.policy_id, "custom");
        assert_eq!(policy.semantics_version, 2);
        assert!(policy.ignores_field("session"));
        assert!(!policy.ignores_field("timestamp"));
        assert!(policy.sorts_list_at("$.tags"));
        assert_eq!(policy.decimals(), Some(3));
        assert!(policy.mask_uuid_like);
        assert!(!policy.normalize_whitespace);
    }

    #[test]
    fn test_snapshot_shape_and_hash() {
        let snap = DiffPolicy::default().snapshot();
        assert!(snap.verify());
        assert_eq!(snap.policy_id(), Some("default-v1"));
        let config = snap.as_value().get("config").unwrap();
        let fields = config.get("ignored_fields").unwrap().as_array().unwrap();
        assert_eq!(fields.first(), Some(&Value::from("approved_at")));
        assert_eq!(
            config.get("normalize_string_whitespace"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_snapshot_changes_with_config() {
        let a = DiffPolicy::default().snapshot();
        let b = DiffPolicy::default().with_mask_uuid_like(true).snapshot();
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), DiffPolicy::default().snapshot().hash());
    }

    #[test]
    fn test_serde_roundtrip() {
        let policy = DiffPolicy::default().with_list_sort_paths(["$.x"]);
        let text = serde_json::to_string(&policy).unwrap();
        assert!(text.contains("normalize_string_whitespace"));
        let back: DiffPolicy = serde_json::from_str(&text).unwrap();
        assert_eq!(back, policy);
    }
}
