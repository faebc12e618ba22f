//! Record file store.
//!
//! Each record lives in its own JSON file; the file is the unit of atomicity.
//! Reads enforce a byte-size ceiling before parsing. Writes go to a temporary
//! sibling and are renamed into place.

use crate::record::{BaselineMetadata, BaselineRecord, ScenarioKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shadow_core::{Clock, ShadowError, ShadowResult, SystemClock, Value};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Default ceiling on a single record file (50 MiB)
pub const DEFAULT_MAX_RECORD_SIZE: u64 = 50 * 1024 * 1024;

/// Limits applied while loading record files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadLimits {
    /// Maximum record file size in bytes
    pub max_record_size: u64,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self {
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl LoadLimits {
    /// Limits with a custom size ceiling
    #[must_use]
    pub const fn with_max_record_size(max_record_size: u64) -> Self {
        Self { max_record_size }
    }
}

/// Which side of a replay a file belongs to; decides the error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Governance-approved baseline
    Baseline,
    /// Fresh capture artifact
    Capture,
}

impl RecordKind {
    fn label(self) -> &'static str {
        match self {
            Self::Baseline => "Baseline",
            Self::Capture => "Capture",
        }
    }

    fn error(self, explanation: String) -> ShadowError {
        match self {
            Self::Baseline => ShadowError::baseline_format(explanation),
            Self::Capture => ShadowError::replay_execution(explanation),
        }
    }
}

/// Baseline file name: `{module}.{function}_{fingerprint}.json`
#[must_use]
pub fn baseline_file_name(key: &ScenarioKey) -> String {
    format!("{}_{}.json", key.function_path(), key.fingerprint())
}

/// Capture file name with a time suffix so one key can be captured repeatedly
#[must_use]
pub fn capture_file_name(key: &ScenarioKey, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.json",
        key.function_path(),
        key.fingerprint(),
        at.format("%Y%m%d%H%M%S_%6f")
    )
}

/// Read at most `limit` bytes; `None` if the reader holds more
fn read_bounded<R: Read>(reader: R, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(bytes))
}

/// Read a JSON object from a record file
fn read_document(path: &Path, limits: &LoadLimits, kind: RecordKind) -> ShadowResult<Value> {
    let too_large = || {
        kind.error(format!(
            "{} file exceeds maximum allowed size ({} bytes): {}",
            kind.label(),
            limits.max_record_size,
            path.display()
        ))
    };
    let file = File::open(path).map_err(|e| ShadowError::io(path.display(), &e))?;
    let meta = file.metadata().map_err(|e| ShadowError::io(path.display(), &e))?;
    if meta.len() > limits.max_record_size {
        return Err(too_large());
    }
    let bytes = read_bounded(file, limits.max_record_size)
        .map_err(|e| ShadowError::io(path.display(), &e))?
        .ok_or_else(too_large)?;
    let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
        kind.error(format!(
            "Invalid JSON in {} file '{}': {}",
            kind.label().to_lowercase(),
            path.display(),
            e
        ))
    })?;
    if document.as_object().is_none() {
        return Err(kind.error(format!(
            "{} file '{}' must contain a JSON object at top level",
            kind.label(),
            path.display()
        )));
    }
    Ok(document)
}

/// Load and validate a baseline record file
///
/// # Errors
///
/// Returns `BaselineFormat` for oversized, malformed, or unsupported files,
/// `BaselineValidation` for schema violations, and `Io` when the file cannot
/// be read
pub fn load_record(path: &Path, limits: &LoadLimits) -> ShadowResult<BaselineRecord> {
    load_record_with_clock(path, limits, &SystemClock)
}

/// [`load_record`] with an explicit clock for defaulted metadata
///
/// # Errors
///
/// See [`load_record`]
pub fn load_record_with_clock(
    path: &Path,
    limits: &LoadLimits,
    clock: &dyn Clock,
) -> ShadowResult<BaselineRecord> {
    let document = read_document(path, limits, RecordKind::Baseline)?;
    BaselineRecord::from_document(document, Some(path), clock)
}

/// Load a capture artifact
///
/// Capture files are usually bare scenarios and are wrapped like legacy
/// baselines. Any failure to read or interpret the file is a replay
/// execution error.
///
/// # Errors
///
/// Returns `ReplayExecution` for oversized, malformed, or invalid files and
/// `Io` when the file cannot be read
pub fn load_capture(path: &Path, limits: &LoadLimits) -> ShadowResult<BaselineRecord> {
    let document = read_document(path, limits, RecordKind::Capture)?;
    BaselineRecord::from_document(document, None, &SystemClock).map_err(|e| {
        ShadowError::replay_execution(format!(
            "Replay execution failed for capture '{}': {}",
            path.display(),
            e.explanation()
        ))
    })
}

/// Write a record atomically, creating parent directories
///
/// Keys are written sorted with two-space indentation.
///
/// # Errors
///
/// Returns `Io` on filesystem failure
pub fn save_record(path: &Path, record: &BaselineRecord) -> ShadowResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ShadowError::io(parent.display(), &e))?;
    }
    let mut text = serde_json::to_string_pretty(&record.to_value().to_json())
        .map_err(|e| ShadowError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    text.push('\n');

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record.json".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, text).map_err(|e| ShadowError::io(tmp.display(), &e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ShadowError::io(path.display(), &e)
    })
}

/// All `*.json` files directly under `dir`, sorted by path
///
/// A missing directory has no records.
///
/// # Errors
///
/// Returns `Io` if the directory exists but cannot be listed
pub fn record_paths(dir: &Path) -> ShadowResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| ShadowError::io(dir.display(), &e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ShadowError::io(dir.display(), &e))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// One row of [`RecordStore::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioListing {
    /// Scenario key
    pub scenario_id: ScenarioKey,
    /// File name within the store
    pub file: String,
    /// Record metadata
    pub metadata: BaselineMetadata,
}

/// A directory of baseline records
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    limits: LoadLimits,
}

impl RecordStore {
    /// Open a store rooted at `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_limits(dir, LoadLimits::default())
    }

    /// Open a store with custom limits
    #[must_use]
    pub fn with_limits(dir: impl Into<PathBuf>, limits: LoadLimits) -> Self {
        Self {
            dir: dir.into(),
            limits,
        }
    }

    /// Store directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load limits
    #[must_use]
    pub const fn limits(&self) -> &LoadLimits {
        &self.limits
    }

    /// Canonical path for a scenario's baseline
    #[must_use]
    pub fn path_for(&self, key: &ScenarioKey) -> PathBuf {
        self.dir.join(baseline_file_name(key))
    }

    /// Load a record by path
    ///
    /// # Errors
    ///
    /// See [`load_record`]
    pub fn load(&self, path: &Path) -> ShadowResult<BaselineRecord> {
        load_record(path, &self.limits)
    }

    /// Save a record under its canonical file name and return the path
    ///
    /// # Errors
    ///
    /// Returns `Io` on filesystem failure
    pub fn save(&self, record: &BaselineRecord) -> ShadowResult<PathBuf> {
        let path = self.path_for(&record.key());
        save_record(&path, record)?;
        Ok(path)
    }

    /// Every record in the store with its key and metadata
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable or invalid record
    pub fn list(&self) -> ShadowResult<Vec<ScenarioListing>> {
        record_paths(&self.dir)?
            .into_iter()
            .map(|path| {
                let record = self.load(&path)?;
                Ok(ScenarioListing {
                    scenario_id: record.key(),
                    file: file_name(&path),
                    metadata: record.metadata,
                })
            })
            .collect()
    }

    /// Locate the file holding a scenario
    ///
    /// # Errors
    ///
    /// Returns `ScenarioNotFound` if no record has that key, or any load error
    pub fn find(&self, scenario_id: &str) -> ShadowResult<PathBuf> {
        for path in record_paths(&self.dir)? {
            let record = self.load(&path)?;
            if record.key().as_str() == scenario_id {
                return Ok(path);
            }
        }
        Err(ShadowError::scenario_not_found(format!(
            "Scenario '{}' not found",
            scenario_id
        )))
    }
}

/// Final path component as text
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CaptureOutput, CaptureScenario, ScenarioStatus};
    use chrono::TimeZone;
    use serde_json::json;
    use shadow_core::Map;
    use tempfile::TempDir;

    fn record(module: &str, function: &str, n: i64) -> BaselineRecord {
        let mut input = Map::new();
        input.insert("n".to_string(), Value::Int(n));
        BaselineRecord {
            scenario: CaptureScenario::new(module, function, input, CaptureOutput::success(n)),
            metadata: BaselineMetadata::pending(&SystemClock),
            approval_history: Vec::new(),
        }
    }

    #[test]
    fn test_file_names() {
        let key = ScenarioKey::new("pkg.mod", "run", "abc");
        assert_eq!(baseline_file_name(&key), "pkg.mod.run_abc.json");
        let at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(capture_file_name(&key, at), "pkg.mod.run_abc_20240203040506_000000.json");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().join("baselines"));
        let original = record("billing", "total", 1);
        let path = store.save(&original).unwrap();
        assert!(path.ends_with(baseline_file_name(&original.key())));

        let loaded = store.load(&path).unwrap();
        assert_eq!(loaded, original);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"semantic_id\""));
        assert!(text.ends_with('\n'));
        assert!(!dir.path().join("baselines").join(format!(".{}.tmp", file_name(&path))).exists());
    }

    #[test]
    fn test_oversized_file_rejected_before_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.json");
        fs::write(&path, "x".repeat(64)).unwrap();
        let err = load_record(&path, &LoadLimits::with_max_record_size(16)).unwrap_err();
        assert_eq!(err.code(), "BASELINE_FORMAT");
        assert!(err.explanation().contains("exceeds maximum allowed size (16 bytes)"));

        let err = load_capture(&path, &LoadLimits::with_max_record_size(16)).unwrap_err();
        assert_eq!(err.code(), "REPLAY_EXECUTION");
    }

    #[test]
    fn test_bounded_read_stops_at_limit() {
        let data = b"0123456789".to_vec();
        assert_eq!(read_bounded(&data[..], 10).unwrap(), Some(data.clone()));
        assert_eq!(read_bounded(&data[..], 9).unwrap(), None);
        assert_eq!(read_bounded(&data[..], 0).unwrap(), None);
        assert_eq!(read_bounded(&b""[..], 0).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_invalid_json_and_non_object() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        let err = load_record(&bad, &LoadLimits::default()).unwrap_err();
        assert_eq!(err.code(), "BASELINE_FORMAT");
        assert!(err.explanation().starts_with("Invalid JSON in baseline file"));

        let list = dir.path().join("list.json");
        fs::write(&list, "[1, 2]").unwrap();
        let err = load_record(&list, &LoadLimits::default()).unwrap_err();
        assert!(err.explanation().contains("must contain a JSON object at top level"));

        let err = load_capture(&bad, &LoadLimits::default()).unwrap_err();
        assert_eq!(err.code(), "REPLAY_EXECUTION");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_record(&dir.path().join("absent.json"), &LoadLimits::default()).unwrap_err();
        assert_eq!(err.code(), "IO");
    }

    #[test]
    fn test_capture_schema_error_is_replay_execution() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.f_x_1.json");
        fs::write(&path, json!({"module": "m"}).to_string()).unwrap();
        let err = load_capture(&path, &LoadLimits::default()).unwrap_err();
        assert_eq!(err.code(), "REPLAY_EXECUTION");
        assert!(err.explanation().contains("missing required field 'function'"));
    }

    #[test]
    fn test_list_and_find() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path());
        let a = record("billing", "total", 1);
        let b = record("billing", "tax", 2);
        store.save(&a).unwrap();
        store.save(&b).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let rows = store.list().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.metadata.status == ScenarioStatus::Pending));

        let found = store.find(a.key().as_str()).unwrap();
        assert_eq!(file_name(&found), baseline_file_name(&a.key()));

        let err = store.find("billing.none:zzz").unwrap_err();
        assert_eq!(err.code(), "SCENARIO_NOT_FOUND");
        assert_eq!(err.explanation(), "Scenario 'billing.none:zzz' not found");
    }

    #[test]
    fn test_missing_directory_has_no_records() {
        let dir = TempDir::new().unwrap();
        assert!(record_paths(&dir.path().join("nope")).unwrap().is_empty());
    }
}
