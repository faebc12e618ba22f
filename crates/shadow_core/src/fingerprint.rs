//! Semantic fingerprints.
//!
//! A fingerprint is a stable identity for a scenario input: the value is
//! canonicalized (object keys sorted, scalars tagged with their type), the
//! canonical form is serialized and hashed with SHA-256, and the hex digest is
//! truncated to [`FINGERPRINT_HEX_LEN`] characters.

use crate::hash::Hash;
use crate::value::{canonical_tag_float, Map, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum canonicalization depth before truncation
pub const MAX_FINGERPRINT_DEPTH: usize = 100;

/// Hex characters kept from the SHA-256 digest (128 bits)
pub const FINGERPRINT_HEX_LEN: usize = 32;

/// Key of the marker object substituted for subtrees past the depth limit
pub const TRUNCATION_KEY: &str = "__sst_truncated__";

/// Value of the truncation marker
pub const TRUNCATION_REASON: &str = "MAX_DEPTH_REACHED";

/// Semantic identity of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a value
    #[must_use]
    pub fn of(value: &Value) -> Self {
        let canonical = canonicalize(value, 0);
        let digest = Hash::compute(canonical.to_canonical_json().as_bytes());
        Self(digest.truncated_hex(FINGERPRINT_HEX_LEN))
    }

    /// Wrap an already computed fingerprint string
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow as string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Fingerprint a value as a hex string
#[must_use]
pub fn fingerprint(value: &Value) -> String {
    Fingerprint::of(value).0
}

/// The marker object substituted for subtrees past the depth limit
#[must_use]
pub fn truncation_marker() -> Value {
    let mut map = Map::new();
    map.insert(TRUNCATION_KEY.to_string(), Value::from(TRUNCATION_REASON));
    Value::Object(map)
}

/// Tagged scalar text: `null:null`, `bool:true`, `int:1`, `float:1.0`, `str:x`
#[must_use]
pub fn scalar_tag(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null:null".to_string()),
        Value::Bool(b) => Some(format!("bool:{}", b)),
        Value::Int(i) => Some(format!("int:{}", i)),
        Value::Float(f) => Some(format!("float:{}", canonical_tag_float(*f))),
        Value::String(s) => Some(format!("str:{}", s)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn canonicalize(value: &Value, depth: usize) -> Value {
    if depth > MAX_FINGERPRINT_DEPTH {
        return truncation_marker();
    }
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v, depth + 1)))
                    .collect(),
            )
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| canonicalize(v, depth + 1)).collect())
        }
        scalar => Value::String(scalar_tag(scalar).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn fp(v: serde_json::Value) -> String {
        fingerprint(&Value::from(v))
    }

    fn nested(depth: usize) -> Value {
        let mut v = Value::Int(0);
        for _ in 0..depth {
            let mut map = Map::new();
            map.insert("n".to_string(), v);
            v = Value::Object(map);
        }
        v
    }

    #[test]
    fn test_order_independent() {
        assert_eq!(fp(json!({"a": 1, "b": 2})), fp(json!({"b": 2, "a": 1})));
    }

    #[test]
    fn test_type_sensitive() {
        assert_ne!(fp(json!({"k": 1})), fp(json!({"k": "1"})));
        assert_ne!(fp(json!(true)), fp(json!(1)));
        assert_ne!(fp(json!(1)), fp(json!(1.0)));
        assert_ne!(fp(json!(null)), fp(json!("null")));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(fp(json!([1, 2])), fp(json!([2, 1])));
    }

    #[test]
    fn test_length_is_32_hex() {
        let f = fp(json!({"x": [1, 2, 3]}));
        assert_eq!(f.len(), FINGERPRINT_HEX_LEN);
        assert!(f.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_numeric_edge_cases() {
        assert_eq!(
            fingerprint(&Value::Float(0.0)),
            fingerprint(&Value::Float(-0.0))
        );
        assert_eq!(
            fingerprint(&Value::Float(f64::NAN)),
            fingerprint(&Value::Float(-f64::NAN))
        );
        assert_ne!(
            fingerprint(&Value::Float(f64::INFINITY)),
            fingerprint(&Value::Float(f64::NEG_INFINITY))
        );
        assert_ne!(
            fingerprint(&Value::Float(f64::INFINITY)),
            fingerprint(&Value::from("inf"))
        );
    }

    #[test]
    fn test_scalar_tags() {
        assert_eq!(scalar_tag(&Value::Null).unwrap(), "null:null");
        assert_eq!(scalar_tag(&Value::Bool(true)).unwrap(), "bool:true");
        assert_eq!(scalar_tag(&Value::Int(-3)).unwrap(), "int:-3");
        assert_eq!(scalar_tag(&Value::Float(2.5)).unwrap(), "float:2.5");
        assert_eq!(scalar_tag(&Value::from("x")).unwrap(), "str:x");
        assert!(scalar_tag(&Value::Array(vec![])).is_none());
    }

    #[test]
    fn test_deep_input_is_truncated() {
        // Everything past the limit collapses into the same marker.
        let a = nested(MAX_FINGERPRINT_DEPTH + 10);
        let b = nested(MAX_FINGERPRINT_DEPTH + 20);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&nested(5)), fingerprint(&nested(6)));
    }

    #[test]
    fn test_fingerprint_newtype() {
        let v = Value::from(json!({"a": 1}));
        let f = Fingerprint::of(&v);
        assert_eq!(f.as_str(), fingerprint(&v));
        assert_eq!(f.to_string(), fingerprint(&v));
    }

    proptest::proptest! {
        #[test]
        fn prop_object_order_independent(entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)) {
            let forward: Map = entries.iter().map(|(k, v)| (k.clone(), Value::Int(*v))).collect();
            let reverse: Map = entries.iter().rev().map(|(k, v)| (k.clone(), Value::Int(*v))).collect();
            prop_assert_eq!(
                fingerprint(&Value::Object(forward)),
                fingerprint(&Value::Object(reverse))
            );
        }

        #[test]
        fn prop_int_never_collides_with_string(n in any::<i64>()) {
            prop_assert_ne!(
                fingerprint(&Value::Int(n)),
                fingerprint(&Value::String(n.to_string()))
            );
        }
    }
}
