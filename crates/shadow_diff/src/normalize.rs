//! Comparison normalization.
//!
//! Rewrites a value into a deterministic form: sorted object keys, unordered
//! lists sorted by canonical text, rounded floats, and masked volatile strings.

use crate::filter::{DEPTH_SENTINEL, MAX_POLICY_DEPTH};
use crate::policy::DiffPolicy;
use once_cell::sync::Lazy;
use regex::Regex;
use shadow_core::time::is_valid_iso_timestamp;
use shadow_core::{Map, Value};

/// Replacement for masked timestamps
pub const TIMESTAMP_MASK: &str = "<timestamp>";

/// Replacement for masked UUIDs
pub const UUID_MASK: &str = "<uuid>";

// Largest magnitude scaled by 10^decimals that still rounds exactly.
const ROUNDING_LIMIT: f64 = 1e15;

// Re-sort passes for a sorted list whose elements contain index-addressed paths.
const MAX_SORT_PASSES: usize = 16;

static ISO_TIMESTAMP: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})$").ok()
});

static UUID_LIKE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-5][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$",
    )
    .ok()
});

/// Normalize a value for comparison under `policy`
#[must_use]
pub fn normalize(value: &Value, policy: &DiffPolicy) -> Value {
    let decimals = policy.decimals();
    normalize_at(value, policy, decimals, "$", 0)
}

/// Apply the full comparison pipeline: [`apply_policy`] then [`normalize`]
///
/// [`apply_policy`]: crate::filter::apply_policy
#[must_use]
pub fn prepare(value: &Value, policy: &DiffPolicy) -> Value {
    normalize(&crate::filter::apply_policy(value, policy), policy)
}

fn normalize_at(
    value: &Value,
    policy: &DiffPolicy,
    decimals: Option<u32>,
    path: &str,
    depth: usize,
) -> Value {
    if depth > MAX_POLICY_DEPTH {
        return Value::from(DEPTH_SENTINEL);
    }
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                if let Some(child) = map.get(key) {
                    let child_path = format!("{}.{}", path, key);
                    sorted.insert(
                        key.clone(),
                        normalize_at(child, policy, decimals, &child_path, depth + 1),
                    );
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => {
            let elements = |items: &[Value]| -> Vec<Value> {
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        let child_path = format!("{}[{}]", path, idx);
                        normalize_at(item, policy, decimals, &child_path, depth + 1)
                    })
                    .collect()
            };
            let mut out = elements(items);
            if policy.sorts_list_at(path) {
                // Element paths are index based, so an element that moves is
                // normalized again at its new index until the order settles.
                for _ in 0..MAX_SORT_PASSES {
                    if out.is_sorted_by_key(Value::to_canonical_json) {
                        break;
                    }
                    out.sort_by_cached_key(Value::to_canonical_json);
                    out = elements(&out);
                }
                if !out.is_sorted_by_key(Value::to_canonical_json) {
                    out.sort_by_cached_key(Value::to_canonical_json);
                }
            }
            Value::Array(out)
        }
        Value::Float(f) => Value::Float(match decimals {
            Some(d) => round_to(*f, d),
            None => *f,
        }),
        Value::String(s) => Value::String(normalize_string(s, policy)),
        scalar => scalar.clone(),
    }
}

/// Round half to even at `decimals` places, leaving values that cannot be
/// scaled untouched
#[must_use]
pub fn round_to(f: f64, decimals: u32) -> f64 {
    if !f.is_finite() || f.abs() >= ROUNDING_LIMIT {
        return f;
    }
    let factor = 10f64.powi(decimals as i32);
    let scaled = f * factor;
    if !scaled.is_finite() || scaled.abs() >= ROUNDING_LIMIT * 10.0 {
        return f;
    }
    let rounded = scaled.round_ties_even() / factor;
    if rounded == 0.0 { 0.0 } else { rounded }
}

fn normalize_string(s: &str, policy: &DiffPolicy) -> String {
    let text = if policy.normalize_whitespace {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        s.to_string()
    };
    if policy.mask_timestamps && is_timestamp(&text) {
        return TIMESTAMP_MASK.to_string();
    }
    if policy.mask_uuid_like && is_uuid_like(&text) {
        return UUID_MASK.to_string();
    }
    text
}

/// ISO-8601 shaped and parseable
#[must_use]
pub fn is_timestamp(text: &str) -> bool {
    ISO_TIMESTAMP.as_ref().is_some_and(|re| re.is_match(text)) && is_valid_iso_timestamp(text)
}

/// UUID versions 1 to 5 in canonical hyphenated form
#[must_use]
pub fn is_uuid_like(text: &str) -> bool {
    UUID_LIKE.as_ref().is_some_and(|re| re.is_match(text))
}
