//! Runtime configuration.
//!
//! Defaults, then `SST_*` environment variables, then command-line flags.
//! Unparsable environment values fall back to the default.

use shadow_core::ShadowResult;
use shadow_diff::DiffPolicy;
use shadow_governance::{GovernancePolicy, Governor, LoadLimits, DEFAULT_MAX_RECORD_SIZE};
use std::path::PathBuf;

const ENV_PREFIX: &str = "SST_";

/// Diff settings carried in configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DiffSettings {
    /// Field names dropped at any depth
    pub ignored_fields: Vec<String>,
    /// Paths dropped exactly
    pub ignored_paths: Vec<String>,
    /// Paths whose lists compare unordered
    pub list_sort_paths: Vec<String>,
    /// Float rounding tolerance
    pub float_tolerance: f64,
    /// Mask ISO-8601 timestamps
    pub mask_timestamps: bool,
    /// Mask UUID-shaped strings
    pub mask_uuid_like: bool,
    /// Collapse string whitespace
    pub normalize_whitespace: bool,
}

impl Default for DiffSettings {
    fn default() -> Self {
        let policy = DiffPolicy::default();
        Self {
            ignored_fields: policy.ignored_fields.into_iter().collect(),
            ignored_paths: Vec::new(),
            list_sort_paths: Vec::new(),
            float_tolerance: policy.float_tolerance,
            mask_timestamps: policy.mask_timestamps,
            mask_uuid_like: policy.mask_uuid_like,
            normalize_whitespace: policy.normalize_whitespace,
        }
    }
}

/// Effective configuration of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    /// Approved baselines
    pub baseline_dir: PathBuf,
    /// Capture artifacts
    pub shadow_dir: PathBuf,
    /// Governance policy name
    pub governance_policy: String,
    /// Fail unlisted governance transitions
    pub strict_governance: bool,
    /// Record file size ceiling in bytes
    pub max_record_size: u64,
    /// Diff settings
    pub diff: DiffSettings,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from(".sst_baseline"),
            shadow_dir: PathBuf::from(".shadow_data"),
            governance_policy: "default".to_string(),
            strict_governance: true,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            diff: DiffSettings::default(),
        }
    }
}

impl ShadowConfig {
    /// Defaults overridden by the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps variable names to values
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(dir) = var("BASELINE_DIR").filter(|v| !v.trim().is_empty()) {
            config.baseline_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("SHADOW_DIR").filter(|v| !v.trim().is_empty()) {
            config.shadow_dir = PathBuf::from(dir);
        }
        if let Some(name) = var("GOVERNANCE_POLICY").filter(|v| !v.trim().is_empty()) {
            config.governance_policy = name;
        }
        config.strict_governance = parse_bool(var("STRICT_GOVERNANCE"), config.strict_governance);
        config.max_record_size = var("MAX_RECORD_SIZE")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(config.max_record_size, |size| size.max(1));
        if let Some(fields) = var("DIFF_IGNORED_FIELDS") {
            config.diff.ignored_fields = parse_list(&fields);
        }
        if let Some(paths) = var("DIFF_IGNORED_PATHS") {
            config.diff.ignored_paths = parse_list(&paths);
        }
        if let Some(paths) = var("DIFF_LIST_SORT_PATHS") {
            config.diff.list_sort_paths = parse_list(&paths);
        }
        config.diff.mask_timestamps =
            parse_bool(var("DIFF_MASK_TIMESTAMPS"), config.diff.mask_timestamps);
        config.diff.mask_uuid_like = parse_bool(var("DIFF_MASK_UUID_LIKE"), config.diff.mask_uuid_like);
        config.diff.normalize_whitespace = parse_bool(
            var("DIFF_NORMALIZE_WHITESPACE"),
            config.diff.normalize_whitespace,
        );
        config.diff.float_tolerance = var("DIFF_FLOAT_TOLERANCE")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(config.diff.float_tolerance);
        config
    }

    /// Validated diff policy
    ///
    /// # Errors
    ///
    /// Returns `DiffContract` for an invalid tolerance
    pub fn diff_policy(&self) -> ShadowResult<DiffPolicy> {
        let policy = DiffPolicy::default()
            .with_ignored_fields(&self.diff.ignored_fields)
            .with_ignored_paths(&self.diff.ignored_paths)
            .with_list_sort_paths(&self.diff.list_sort_paths)
            .with_float_tolerance(self.diff.float_tolerance)
            .with_mask_timestamps(self.diff.mask_timestamps)
            .with_mask_uuid_like(self.diff.mask_uuid_like)
            .with_normalize_whitespace(self.diff.normalize_whitespace);
        policy.validate()?;
        Ok(policy)
    }

    /// Governance policy selected by name
    ///
    /// # Errors
    ///
    /// Returns `GovernancePolicy` for an unknown name
    pub fn governance_policy(&self) -> ShadowResult<GovernancePolicy> {
        GovernancePolicy::resolve(Some(&self.governance_policy))
    }

    /// Governor over the configured policies
    ///
    /// # Errors
    ///
    /// See [`ShadowConfig::diff_policy`] and [`ShadowConfig::governance_policy`]
    pub fn governor(&self) -> ShadowResult<Governor> {
        Ok(Governor::new(self.governance_policy()?, self.diff_policy()?)
            .with_strict(self.strict_governance))
    }

    /// Record load limits
    #[must_use]
    pub fn limits(&self) -> LoadLimits {
        LoadLimits::with_max_record_size(self.max_record_size)
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
