//! Content-addressed policy snapshots.
//!
//! A snapshot is the policy payload serialized canonically, plus a `hash`
//! member holding the SHA-256 of that canonical text. Snapshots are stored by
//! value in record metadata so later policy changes cannot rewrite history.

use crate::hash::sha256_hex;
use crate::value::{Map, Value};
use serde::{Deserialize, Serialize};

/// Name of the member that carries the payload digest
pub const SNAPSHOT_HASH_KEY: &str = "hash";

/// Sealed policy snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicySnapshot(Value);

impl PolicySnapshot {
    /// Seal a payload, appending its hash
    ///
    /// Any existing `hash` member in the payload is replaced.
    #[must_use]
    pub fn seal(mut payload: Map) -> Self {
        payload.shift_remove(SNAPSHOT_HASH_KEY);
        let digest = sha256_hex(&Value::Object(payload.clone()).to_canonical_json());
        payload.insert(SNAPSHOT_HASH_KEY.to_string(), Value::String(digest));
        Self(Value::Object(payload))
    }

    /// Wrap a stored snapshot without checking it
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Stored hash, if present
    #[must_use]
    pub fn hash(&self) -> Option<&str> {
        self.0.get(SNAPSHOT_HASH_KEY).and_then(Value::as_str)
    }

    /// Stored policy id, if present
    #[must_use]
    pub fn policy_id(&self) -> Option<&str> {
        self.0.get("policy_id").and_then(Value::as_str)
    }

    /// Stored `semantics_version` member
    #[must_use]
    pub fn semantics_version(&self) -> Option<&Value> {
        self.0.get("semantics_version")
    }

    /// Payload without the hash member
    #[must_use]
    pub fn payload(&self) -> Map {
        let mut map = self.0.as_object().cloned().unwrap_or_default();
        map.shift_remove(SNAPSHOT_HASH_KEY);
        map
    }

    /// Recompute the hash and compare it with the stored one
    #[must_use]
    pub fn verify(&self) -> bool {
        match self.hash() {
            Some(stored) => {
                sha256_hex(&Value::Object(self.payload()).to_canonical_json()) == stored
            }
            None => false,
        }
    }

    /// Borrow the snapshot as a value
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into a value
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}
