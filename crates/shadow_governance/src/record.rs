//! Capture and baseline record model.
//!
//! Records are parsed from loosely typed JSON at the load boundary and are
//! fully validated there; nothing downstream sees a partially populated
//! record. Unknown members are preserved so rewriting a record never drops
//! data written by a newer collaborator.

use serde::{Deserialize, Serialize, Serializer};
use shadow_core::{
    fingerprint, Clock, Map, PolicySnapshot, ShadowError, ShadowResult, Value,
    BASELINE_FORMAT_VERSION, ENGINE_VERSION,
};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Lifecycle status of a baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// Recorded but not yet approved
    Pending,
    /// Ground truth for replay
    Approved,
    /// Retired; skipped by replay
    Deprecated,
}

impl ScenarioStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized status text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown scenario status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ScenarioStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "deprecated" => Ok(Self::Deprecated),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Governance action recorded in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    /// Baseline created directly from a capture
    Record,
    /// Approval or re-approval
    Approve,
    /// Retirement
    Deprecate,
}

/// One append-only history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    /// When the action happened
    #[serde(rename = "approved_at", alias = "timestamp")]
    pub timestamp: String,
    /// What happened
    pub action: ApprovalAction,
}

impl ApprovalEntry {
    /// Create an entry
    #[must_use]
    pub fn new(timestamp: impl Into<String>, action: ApprovalAction) -> Self {
        Self {
            timestamp: timestamp.into(),
            action,
        }
    }
}

/// Scenario identity: `<module>.<function>:<fingerprint>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioKey(String);

impl ScenarioKey {
    /// Build from parts
    #[must_use]
    pub fn new(module: &str, function: &str, fingerprint: &str) -> Self {
        Self(format!("{}.{}:{}", module, function, fingerprint))
    }

    /// Parse `<module>.<function>:<fingerprint>`
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (func_path, fp) = text.rsplit_once(':')?;
        let (module, function) = func_path.rsplit_once('.')?;
        if module.is_empty() || function.is_empty() || fp.is_empty() {
            return None;
        }
        Some(Self(text.to_string()))
    }

    /// `<module>.<function>` part
    #[must_use]
    pub fn function_path(&self) -> &str {
        self.0.rsplit_once(':').map_or(self.0.as_str(), |(path, _)| path)
    }

    /// Fingerprint part
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.0.rsplit_once(':').map_or("", |(_, fp)| fp)
    }

    /// Borrow as string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of one observed call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptureOutput {
    /// Capture not finalized
    #[default]
    Unknown,
    /// Call returned
    Success {
        /// Returned value (masked)
        raw_result: Value,
    },
    /// Call raised
    Failure {
        /// Error message
        error: String,
        /// Error type name
        error_type: String,
    },
}

impl CaptureOutput {
    /// Successful output
    #[must_use]
    pub fn success(raw_result: impl Into<Value>) -> Self {
        Self::Success {
            raw_result: raw_result.into(),
        }
    }

    /// Failed output
    #[must_use]
    pub fn failure(error: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
            error_type: error_type.into(),
        }
    }

    /// Parse leniently: `status` decides the variant, falling back to the
    /// members present
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let status = value.get("status").and_then(Value::as_str);
        match status {
            Some("success") => Self::Success {
                raw_result: value.get("raw_result").cloned().unwrap_or_default(),
            },
            Some("failure") => Self::Failure {
                error: text("error"),
                error_type: text("error_type"),
            },
            Some(_) => Self::Unknown,
            None if value.get("raw_result").is_some() => Self::Success {
                raw_result: value.get("raw_result").cloned().unwrap_or_default(),
            },
            None if value.get("error").is_some() => Self::Failure {
                error: text("error"),
                error_type: text("error_type"),
            },
            None => Self::Unknown,
        }
    }

    /// Wire form
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        match self {
            Self::Unknown => {
                map.insert("status".to_string(), Value::from("unknown"));
            }
            Self::Success { raw_result } => {
                map.insert("status".to_string(), Value::from("success"));
                map.insert("raw_result".to_string(), raw_result.clone());
            }
            Self::Failure { error, error_type } => {
                map.insert("status".to_string(), Value::from("failure"));
                map.insert("error".to_string(), Value::from(error.as_str()));
                map.insert("error_type".to_string(), Value::from(error_type.as_str()));
            }
        }
        Value::Object(map)
    }

    /// The value compared during replay
    ///
    /// A failure compares as `{"error", "error_type"}` and an unknown output as
    /// `null`, so flipping between success and failure is a type change.
    #[must_use]
    pub fn comparable(&self) -> Value {
        match self {
            Self::Unknown => Value::Null,
            Self::Success { raw_result } => raw_result.clone(),
            Self::Failure { error, error_type } => {
                let mut map = Map::new();
                map.insert("error".to_string(), Value::from(error.as_str()));
                map.insert("error_type".to_string(), Value::from(error_type.as_str()));
                Value::Object(map)
            }
        }
    }
}

const SCENARIO_FIELDS: &[&str] = &[
    "module",
    "function",
    "semantic_id",
    "engine_version",
    "timestamp",
    "input",
    "output",
    "dependencies",
];

/// One observed call with masked input and output
///
/// Identity is (module, function, fingerprint). The fingerprint is stored
/// under the `semantic_id` member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureScenario {
    /// Module of the called function
    pub module: String,
    /// Function name
    pub function: String,
    /// Fingerprint of the input
    pub fingerprint: String,
    /// Engine that produced the capture
    pub engine_version: Option<String>,
    /// Capture time
    pub timestamp: Option<String>,
    /// Masked input
    pub input: Map,
    /// Masked output
    pub output: CaptureOutput,
    /// Names of functions the call depends on
    pub dependencies: Vec<String>,
    /// Members this engine does not interpret
    pub extra: Map,
}

impl CaptureScenario {
    /// Create a scenario, fingerprinting the input
    #[must_use]
    pub fn new(
        module: impl Into<String>,
        function: impl Into<String>,
        input: Map,
        output: CaptureOutput,
    ) -> Self {
        let fingerprint = fingerprint(&Value::Object(input.clone()));
        Self {
            module: module.into(),
            function: function.into(),
            fingerprint,
            engine_version: Some(ENGINE_VERSION.to_string()),
            timestamp: None,
            input,
            output,
            dependencies: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Set the capture time
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Set the dependency list
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Scenario key
    #[must_use]
    pub fn key(&self) -> ScenarioKey {
        ScenarioKey::new(&self.module, &self.function, &self.fingerprint)
    }

    /// Parse and validate a scenario object
    ///
    /// # Errors
    ///
    /// Returns `BaselineValidation` naming the first missing or mistyped
    /// field
    pub fn from_value(value: &Value) -> ShadowResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ShadowError::baseline_validation("Baseline scenario must be a JSON object"))?;

        for field in ["module", "function", "semantic_id", "input", "output"] {
            if !obj.contains_key(field) {
                return Err(ShadowError::baseline_validation(format!(
                    "Baseline scenario missing required field '{}'",
                    field
                )));
            }
        }

        let module = required_text(obj, "module")?;
        let function = required_text(obj, "function")?;
        let fingerprint = required_text(obj, "semantic_id")?;
        let engine_version = match obj.get("engine_version") {
            Some(_) => Some(required_text(obj, "engine_version")?),
            None => None,
        };

        let input = match obj.get("input") {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(ShadowError::baseline_validation(format!(
                    "Invalid baseline scenario field 'input': expected dict, got {}",
                    other.type_name()
                )));
            }
            None => Map::new(),
        };
        let output = obj.get("output").map(CaptureOutput::from_value).unwrap_or_default();

        let mut extra = Map::new();
        let timestamp = match obj.get("timestamp") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                extra.insert("timestamp".to_string(), other.clone());
                None
            }
            None => None,
        };
        let dependencies = match obj.get("dependencies") {
            None => Vec::new(),
            Some(deps) => match string_items(deps) {
                Some(list) => list,
                None => {
                    extra.insert("dependencies".to_string(), deps.clone());
                    Vec::new()
                }
            },
        };
        for (key, member) in obj {
            if !SCENARIO_FIELDS.contains(&key.as_str()) {
                extra.insert(key.clone(), member.clone());
            }
        }

        Ok(Self {
            module,
            function,
            fingerprint,
            engine_version,
            timestamp,
            input,
            output,
            dependencies,
            extra,
        })
    }

    /// Wire form
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("module".to_string(), Value::from(self.module.as_str()));
        map.insert("function".to_string(), Value::from(self.function.as_str()));
        map.insert("semantic_id".to_string(), Value::from(self.fingerprint.as_str()));
        if let Some(version) = &self.engine_version {
            map.insert("engine_version".to_string(), Value::from(version.as_str()));
        }
        if let Some(ts) = &self.timestamp {
            map.insert("timestamp".to_string(), Value::from(ts.as_str()));
        }
        map.insert("input".to_string(), Value::Object(self.input.clone()));
        map.insert("output".to_string(), self.output.to_value());
        map.insert(
            "dependencies".to_string(),
            Value::Array(self.dependencies.iter().map(|d| Value::from(d.as_str())).collect()),
        );
        for (key, member) in &self.extra {
            map.entry(key.clone()).or_insert_with(|| member.clone());
        }
        Value::Object(map)
    }
}

impl Serialize for CaptureScenario {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CaptureScenario {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// Governance metadata attached to a baseline
///
/// Serializes through [`BaselineMetadata::to_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineMetadata {
    /// Record file format
    pub format_version: i64,
    /// Opaque id regenerated on every approval
    pub version_id: String,
    /// Creation time
    pub created_at: String,
    /// Last approval time
    pub approved_at: Option<String>,
    /// Lifecycle status
    pub status: ScenarioStatus,
    /// Diff policy in force at the last approval
    pub diff_policy_snapshot: Option<PolicySnapshot>,
    /// Governance policy in force at the last approval
    pub governance_policy_snapshot: Option<PolicySnapshot>,
    /// Members this engine does not interpret
    pub extra: Map,
}

const METADATA_FIELDS: &[&str] = &[
    "format_version",
    "version_id",
    "created_at",
    "approved_at",
    "scenario_status",
    "diff_policy_snapshot",
    "governance_policy_snapshot",
];

impl BaselineMetadata {
    /// Fresh pending metadata without policy snapshots
    #[must_use]
    pub fn pending(clock: &dyn Clock) -> Self {
        Self {
            format_version: BASELINE_FORMAT_VERSION,
            version_id: new_version_id(),
            created_at: clock.now_iso(),
            approved_at: None,
            status: ScenarioStatus::Pending,
            diff_policy_snapshot: None,
            governance_policy_snapshot: None,
            extra: Map::new(),
        }
    }

    fn from_value(value: Option<&Value>, clock: &dyn Clock) -> ShadowResult<Self> {
        let mut meta = Self::pending(clock);
        let obj = match value {
            None | Some(Value::Null) => return Ok(meta),
            Some(Value::Object(obj)) => obj,
            Some(_) => {
                return Err(ShadowError::baseline_format(
                    "Baseline record missing required object field: metadata",
                ));
            }
        };

        if let Some(version) = obj.get("format_version") {
            meta.format_version = version.as_i64().ok_or_else(|| {
                ShadowError::baseline_format(
                    "Baseline metadata missing required integer field: format_version",
                )
            })?;
        }
        if let Some(id) = optional_text(obj, "version_id")? {
            meta.version_id = id;
        }
        if let Some(created) = optional_text(obj, "created_at")? {
            meta.created_at = created;
        }
        meta.approved_at = optional_text(obj, "approved_at")?;
        if let Some(status) = optional_text(obj, "scenario_status")? {
            meta.status = status.parse().map_err(|e: UnknownStatus| {
                ShadowError::baseline_validation(format!(
                    "Invalid baseline metadata field 'scenario_status': {}",
                    e
                ))
            })?;
        }
        meta.diff_policy_snapshot = snapshot_member(obj, "diff_policy_snapshot")?;
        meta.governance_policy_snapshot = snapshot_member(obj, "governance_policy_snapshot")?;
        for (key, member) in obj {
            if !METADATA_FIELDS.contains(&key.as_str()) {
                meta.extra.insert(key.clone(), member.clone());
            }
        }
        Ok(meta)
    }
}

/// The unit of persistence and of governance
///
/// Serializes through [`BaselineRecord::to_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineRecord {
    /// Recorded scenario
    pub scenario: CaptureScenario,
    /// Governance metadata
    pub metadata: BaselineMetadata,
    /// Append-only action log
    pub approval_history: Vec<ApprovalEntry>,
}

impl BaselineRecord {
    /// Scenario key
    #[must_use]
    pub fn key(&self) -> ScenarioKey {
        self.scenario.key()
    }

    /// Lifecycle status
    #[must_use]
    pub fn status(&self) -> ScenarioStatus {
        self.metadata.status
    }

    /// Parse a record document, upgrading legacy layouts
    ///
    /// A document without a `scenario` object is a bare legacy scenario and
    /// is wrapped. Identity members missing from a legacy scenario are
    /// recovered from a `{module}.{function}_{fingerprint}.json` file name;
    /// missing `input`/`output` default to `{}`.
    ///
    /// # Errors
    ///
    /// Returns `BaselineFormat` for structural problems or an unsupported
    /// format version and `BaselineValidation` for scenario schema violations
    pub fn from_document(
        document: Value,
        source: Option<&Path>,
        clock: &dyn Clock,
    ) -> ShadowResult<Self> {
        let Value::Object(mut doc) = document else {
            return Err(ShadowError::baseline_format(
                "Baseline record must be a JSON object",
            ));
        };

        let mut scenario = match doc.get("scenario") {
            Some(Value::Object(_)) => doc.shift_remove("scenario").unwrap_or_default(),
            Some(_) => {
                return Err(ShadowError::baseline_format(
                    "Baseline record missing required object field: scenario",
                ));
            }
            None => Value::Object(std::mem::take(&mut doc)),
        };

        if let Some(obj) = scenario.as_object_mut() {
            if let Some(path) = source {
                for (field, text) in identity_from_file_name(path) {
                    obj.entry(field.to_string()).or_insert(Value::String(text));
                }
            }
            obj.entry("input".to_string()).or_insert_with(Value::empty_object);
            obj.entry("output".to_string()).or_insert_with(Value::empty_object);
        }

        let metadata = BaselineMetadata::from_value(doc.get("metadata"), clock)?;
        migrate_for_version(metadata.format_version)?;

        let approval_history = match doc.get("approval_history") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| parse_history_entry(idx, item))
                .collect::<ShadowResult<Vec<_>>>()?,
            Some(_) => {
                return Err(ShadowError::baseline_format(
                    "Baseline record field 'approval_history' must be a list",
                ));
            }
        };

        let scenario = CaptureScenario::from_value(&scenario)?;
        Ok(Self {
            scenario,
            metadata,
            approval_history,
        })
    }

    /// Wire form
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("scenario".to_string(), self.scenario.to_value());
        map.insert("metadata".to_string(), self.metadata.to_value());
        map.insert(
            "approval_history".to_string(),
            Value::Array(
                self.approval_history
                    .iter()
                    .map(|entry| {
                        let mut e = Map::new();
                        e.insert("approved_at".to_string(), Value::from(entry.timestamp.as_str()));
                        e.insert(
                            "action".to_string(),
                            Value::from(match entry.action {
                                ApprovalAction::Record => "record",
                                ApprovalAction::Approve => "approve",
                                ApprovalAction::Deprecate => "deprecate",
                            }),
                        );
                        Value::Object(e)
                    })
                    .collect(),
            ),
        );
        Value::Object(map)
    }
}

impl BaselineMetadata {
    /// Wire form
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("format_version".to_string(), Value::Int(self.format_version));
        map.insert("version_id".to_string(), Value::from(self.version_id.as_str()));
        map.insert("created_at".to_string(), Value::from(self.created_at.as_str()));
        map.insert(
            "approved_at".to_string(),
            self.approved_at.as_deref().map_or(Value::Null, Value::from),
        );
        map.insert("scenario_status".to_string(), Value::from(self.status.as_str()));
        if let Some(snap) = &self.diff_policy_snapshot {
            map.insert("diff_policy_snapshot".to_string(), snap.as_value().clone());
        }
        if let Some(snap) = &self.governance_policy_snapshot {
            map.insert("governance_policy_snapshot".to_string(), snap.as_value().clone());
        }
        for (key, member) in &self.extra {
            map.entry(key.clone()).or_insert_with(|| member.clone());
        }
        Value::Object(map)
    }
}

impl Serialize for BaselineMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl Serialize for BaselineRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Migration hook per format version
///
/// # Errors
///
/// Returns `BaselineFormat` for versions this engine cannot read
pub fn migrate_for_version(version: i64) -> ShadowResult<()> {
    if shadow_core::version::is_supported_format(version) {
        return Ok(());
    }
    Err(ShadowError::baseline_format(format!(
        "Unsupported baseline format version: {} (supported={:?})",
        version,
        shadow_core::SUPPORTED_FORMAT_VERSIONS
    )))
}

/// Fresh opaque version id
#[must_use]
pub fn new_version_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Recover `module`, `function`, `semantic_id` from a baseline file name
#[must_use]
pub fn identity_from_file_name(path: &Path) -> Vec<(&'static str, String)> {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    let Some((func_path, fp)) = stem.rsplit_once('_') else {
        return Vec::new();
    };
    let Some((module, function)) = func_path.rsplit_once('.') else {
        return Vec::new();
    };
    if module.is_empty() || function.is_empty() || fp.is_empty() {
        return Vec::new();
    }
    vec![
        ("module", module.to_string()),
        ("function", function.to_string()),
        ("semantic_id", fp.to_string()),
    ]
}

fn parse_history_entry(idx: usize, item: &Value) -> ShadowResult<ApprovalEntry> {
    let invalid = || {
        ShadowError::baseline_format(format!("Invalid approval_history entry at index {}", idx))
    };
    let timestamp = item
        .get("approved_at")
        .or_else(|| item.get("timestamp"))
        .and_then(Value::as_str)
        .ok_or_else(invalid)?;
    let action = match item.get("action").and_then(Value::as_str) {
        Some("record") => ApprovalAction::Record,
        Some("approve") => ApprovalAction::Approve,
        Some("deprecate") => ApprovalAction::Deprecate,
        _ => return Err(invalid()),
    };
    Ok(ApprovalEntry::new(timestamp, action))
}

fn required_text(obj: &Map, field: &str) -> ShadowResult<String> {
    match obj.get(field) {
        Some(Value::String(s)) if s.trim().is_empty() => Err(ShadowError::baseline_validation(
            format!("Invalid baseline scenario field '{}': must be non-empty string", field),
        )),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ShadowError::baseline_validation(format!(
            "Invalid baseline scenario field '{}': expected str, got {}",
            field,
            other.type_name()
        ))),
        None => Err(ShadowError::baseline_validation(format!(
            "Baseline scenario missing required field '{}'",
            field
        ))),
    }
}

fn optional_text(obj: &Map, field: &str) -> ShadowResult<Option<String>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ShadowError::baseline_validation(format!(
            "Invalid baseline metadata field '{}': expected str, got {}",
            field,
            other.type_name()
        ))),
    }
}

fn snapshot_member(obj: &Map, field: &str) -> ShadowResult<Option<PolicySnapshot>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(value @ Value::Object(_)) => Ok(Some(PolicySnapshot::from_value(value.clone()))),
        Some(other) => Err(ShadowError::baseline_validation(format!(
            "Invalid baseline metadata field '{}': expected dict, got {}",
            field,
            other.type_name()
        ))),
    }
}

fn string_items(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}
