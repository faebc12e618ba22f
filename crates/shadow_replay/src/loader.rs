//! Baseline and capture set loading.
//!
//! Both sets are true key to record mappings. A key seen twice among
//! baselines is an execution error naming both sources; a key seen twice
//! among captures of one run is a determinism error. Deprecated baselines
//! are skipped before keying.

use shadow_core::{ShadowError, ShadowResult};
use shadow_governance::{
    file_name, load_capture, load_record, record_paths, BaselineRecord, LoadLimits, ScenarioKey,
    ScenarioStatus,
};
use std::collections::btree_map::{self, BTreeMap, Entry};
use std::path::Path;

/// Approved and pending baselines keyed by scenario
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineSet {
    records: BTreeMap<ScenarioKey, BaselineRecord>,
    sources: BTreeMap<ScenarioKey, String>,
}

impl BaselineSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` baseline under `dir`
    ///
    /// # Errors
    ///
    /// Propagates record load errors unmodified and returns
    /// `ReplayExecution` for a duplicate key
    pub fn load(dir: &Path, limits: &LoadLimits) -> ShadowResult<Self> {
        let mut set = Self::new();
        for path in record_paths(dir)? {
            let record = load_record(&path, limits)?;
            set.insert(file_name(&path), record)?;
        }
        tracing::debug!(dir = %dir.display(), count = set.len(), "baselines loaded");
        Ok(set)
    }

    /// Add a record from `source`; deprecated records are skipped
    ///
    /// Returns whether the record was added.
    ///
    /// # Errors
    ///
    /// Returns `ReplayExecution` if the key is already present
    pub fn insert(&mut self, source: impl Into<String>, record: BaselineRecord) -> ShadowResult<bool> {
        let source = source.into();
        if record.status() == ScenarioStatus::Deprecated {
            tracing::debug!(source = %source, "skipping deprecated baseline");
            return Ok(false);
        }
        let key = record.key();
        match self.sources.entry(key.clone()) {
            Entry::Occupied(existing) => Err(ShadowError::replay_execution(format!(
                "Duplicate scenario key detected: {}. Files: {} and {}",
                key,
                existing.get(),
                source
            ))),
            Entry::Vacant(slot) => {
                slot.insert(source);
                self.records.insert(key, record);
                Ok(true)
            }
        }
    }

    /// Record for a key
    #[must_use]
    pub fn get(&self, key: &ScenarioKey) -> Option<&BaselineRecord> {
        self.records.get(key)
    }

    /// Source a key was loaded from
    #[must_use]
    pub fn source(&self, key: &ScenarioKey) -> Option<&str> {
        self.sources.get(key).map(String::as_str)
    }

    /// Records in key order
    pub fn iter(&self) -> btree_map::Iter<'_, ScenarioKey, BaselineRecord> {
        self.records.iter()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Captures from a single run keyed by scenario
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureSet {
    records: BTreeMap<ScenarioKey, BaselineRecord>,
}

impl CaptureSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` capture under `dir`
    ///
    /// # Errors
    ///
    /// Returns `ReplayExecution` for unreadable or invalid captures and
    /// `ReplayDeterminism` for a duplicate key
    pub fn load(dir: &Path, limits: &LoadLimits) -> ShadowResult<Self> {
        let mut set = Self::new();
        for path in record_paths(dir)? {
            let record = load_capture(&path, limits)?;
            set.insert(path.display().to_string(), record)?;
        }
        tracing::debug!(dir = %dir.display(), count = set.len(), "captures loaded");
        Ok(set)
    }

    /// Add a capture from `source`
    ///
    /// # Errors
    ///
    /// Returns `ReplayDeterminism` if the key is already present
    pub fn insert(&mut self, source: impl Into<String>, record: BaselineRecord) -> ShadowResult<()> {
        let key = record.key();
        match self.records.entry(key.clone()) {
            Entry::Occupied(_) => Err(ShadowError::replay_determinism(format!(
                "Replay capture is non-deterministic: duplicate scenario key '{}' in capture artifacts.\n\n\
                 Hint: the shadow directory contains captures from multiple runs.\n\
                 Clear the shadow directory before verify.\n\
                 Conflicting file: {}",
                key,
                source.into()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Capture for a key
    #[must_use]
    pub fn get(&self, key: &ScenarioKey) -> Option<&BaselineRecord> {
        self.records.get(key)
    }

    /// Number of captures
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
