//! Field and path suppression.

use crate::policy::DiffPolicy;
use shadow_core::{Map, Value};

/// Depth past which subtrees are replaced by [`DEPTH_SENTINEL`]
pub const MAX_POLICY_DEPTH: usize = 100;

/// Replacement for subtrees past [`MAX_POLICY_DEPTH`]
pub const DEPTH_SENTINEL: &str = "[MAX_DEPTH_REACHED]";

/// Return a copy of `value` with the fields and paths ignored by `policy` removed
///
/// Object members whose name is ignored (case-insensitive) or whose path is
/// ignored are dropped. An ignored array element is replaced by `null` so
/// sibling indices stay stable; an ignored root yields `null`.
#[must_use]
pub fn apply_policy(value: &Value, policy: &DiffPolicy) -> Value {
    apply_at(value, policy, "$", 0)
}

fn apply_at(value: &Value, policy: &DiffPolicy, path: &str, depth: usize) -> Value {
    if depth > MAX_POLICY_DEPTH {
        return Value::from(DEPTH_SENTINEL);
    }
    if policy.ignores_path(path) {
        return Value::Null;
    }
    match value {
        Value::Object(map) => {
            let mut kept = Map::with_capacity(map.len());
            for (key, child) in map {
                let key_path = format!("{}.{}", path, key);
                if policy.ignores_field(key) || policy.ignores_path(&key_path) {
                    continue;
                }
                kept.insert(key.clone(), apply_at(child, policy, &key_path, depth + 1));
            }
            Value::Object(kept)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| apply_at(item, policy, &format!("{}[{}]", path, idx), depth + 1))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}
