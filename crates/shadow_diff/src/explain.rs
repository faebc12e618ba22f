//! Rendering of structural changes for people.

use crate::diff::{ChangeType, DiffChange};
use once_cell::sync::Lazy;
use regex::Regex;
use shadow_core::Value;
use std::collections::BTreeMap;

/// Summary for an empty change list
pub const NO_DIFFERENCES_SUMMARY: &str = "No semantic differences detected.";

/// Human rendering for an empty change list
pub const NO_DIFFERENCES_HUMAN: &str = "No differences.";

static TRAILING_INDEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[\d+\]$").ok());

/// Deterministic one-line digest of a change list
///
/// Counts by change type and by severity (each sorted by name), followed by
/// the paths of the first three changes.
#[must_use]
pub fn summarize(changes: &[DiffChange]) -> String {
    if changes.is_empty() {
        return NO_DIFFERENCES_SUMMARY.to_string();
    }

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_severity: BTreeMap<&str, usize> = BTreeMap::new();
    for change in changes {
        *by_type.entry(change.change_type.as_str()).or_default() += 1;
        *by_severity.entry(change.severity.as_str()).or_default() += 1;
    }

    let counts = |map: &BTreeMap<&str, usize>| {
        map.iter()
            .map(|(name, count)| format!("{}={}", name, count))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let top_paths = changes
        .iter()
        .take(3)
        .map(|c| c.path.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Detected {} difference(s): {}; severity: {}. Most impacted paths: {}.",
        changes.len(),
        counts(&by_type),
        counts(&by_severity),
        top_paths
    )
}

/// One line per change, plus a reorder hint when the changes look like a
/// pure permutation of list elements
///
/// Prefixes: `~` modified, `+` added, `-` removed.
#[must_use]
pub fn explain_human(changes: &[DiffChange]) -> String {
    if changes.is_empty() {
        return NO_DIFFERENCES_HUMAN.to_string();
    }

    let mut lines: Vec<String> = changes.iter().map(render_line).collect();
    if let Some(hint) = reorder_hint(changes) {
        lines.push(String::new());
        lines.push(hint);
    }
    lines.join("\n")
}

fn render_line(change: &DiffChange) -> String {
    let sev = change.severity;
    let path = &change.path;
    match change.change_type {
        ChangeType::ValueChanged => format!(
            "~ [{}] {}: {} -> {}",
            sev,
            path,
            show(change.baseline.as_ref()),
            show(change.current.as_ref())
        ),
        ChangeType::TypeChanged => format!(
            "~ [{}] {}: type {} -> {} ({} -> {})",
            sev,
            path,
            change.baseline_type.as_deref().unwrap_or("unknown"),
            change.current_type.as_deref().unwrap_or("unknown"),
            show(change.baseline.as_ref()),
            show(change.current.as_ref())
        ),
        ChangeType::Added => format!("+ [{}] {}: {}", sev, path, show(change.current.as_ref())),
        ChangeType::Removed => format!("- [{}] {}: {}", sev, path, show(change.baseline.as_ref())),
        ChangeType::LengthChanged => format!(
            "~ [{}] {}: length {} -> {}",
            sev,
            path,
            show(change.baseline.as_ref()),
            show(change.current.as_ref())
        ),
        ChangeType::PolicyDrift => format!("~ [{}] {}: policy drift", sev, path),
    }
}

fn show(value: Option<&Value>) -> String {
    value.map_or_else(|| "null".to_string(), Value::to_canonical_json)
}

/// Parent of an element path (`$.xs[3]` becomes `$.xs`)
#[must_use]
pub fn parent_path(path: &str) -> String {
    match TRAILING_INDEX.as_ref() {
        Some(re) => re.replace(path, "").into_owned(),
        None => path.to_string(),
    }
}

/// Suggest `list_sort_paths` entries for lists whose values only moved
///
/// `ValueChanged` entries are grouped by parent path; a group whose multiset
/// of baseline values equals its multiset of current values is a reorder.
#[must_use]
pub fn reorder_hint(changes: &[DiffChange]) -> Option<String> {
    let mut groups: BTreeMap<String, (Vec<String>, Vec<String>)> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    for change in changes.iter().filter(|c| c.is(ChangeType::ValueChanged)) {
        let parent = parent_path(&change.path);
        if !groups.contains_key(&parent) {
            order.push(parent.clone());
        }
        let entry = groups.entry(parent).or_default();
        entry.0.push(show(change.baseline.as_ref()));
        entry.1.push(show(change.current.as_ref()));
    }

    let reordered: Vec<String> = order
        .into_iter()
        .filter(|parent| {
            groups.get_mut(parent).is_some_and(|(before, after)| {
                before.sort();
                after.sort();
                before == after
            })
        })
        .collect();
    if reordered.is_empty() {
        return None;
    }

    let quoted = reordered
        .iter()
        .map(|p| format!("\"{}\"", p))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "Hint: values are identical but order differs, which may be non-deterministic ordering.\n\
         If order does not matter, add these paths to the diff policy:\n  \
         list_sort_paths = [{}]\n\
         If order matters, check the code under test for unordered sources \
         (sets, directory listings, queries without ORDER BY, parallel tasks).",
        quoted
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use serde_json::json;

    fn v(j: serde_json::Value) -> Value {
        Value::from(j)
    }

    #[test]
    fn test_summarize_empty() {
        assert_eq!(summarize(&[]), "No semantic differences detected.");
        assert_eq!(explain_human(&[]), "No differences.");
    }

    #[test]
    fn test_summarize_counts_and_paths() {
        let changes = diff(
            &v(json!({"a": 1, "b": 2, "gone": 0, "list": [1, 2]})),
            &v(json!({"a": 5, "b": "2", "list": [1]})),
        )
        .unwrap();
        assert_eq!(
            summarize(&changes),
            "Detected 4 difference(s): length_changed=1, removed=1, type_changed=1, value_changed=1; \
             severity: high=2, medium=2. Most impacted paths: $.gone, $.a, $.b."
        );
    }

    #[test]
    fn test_explain_human_lines() {
        let changes = diff(
            &v(json!({"a": 1, "b": 2, "gone": "x", "list": [1, 2]})),
            &v(json!({"a": 5, "b": "2", "new": true, "list": [1]})),
        )
        .unwrap();
        let text = explain_human(&changes);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "- [high] $.gone: \"x\"",
                "+ [high] $.new: true",
                "~ [medium] $.a: 1 -> 5",
                "~ [high] $.b: type int -> str (2 -> \"2\")",
                "~ [medium] $.list: length 2 -> 1",
            ]
        );
    }

    #[test]
    fn test_reorder_hint_for_permutation() {
        let changes = diff(&v(json!({"types": ["a", "b"]})), &v(json!({"types": ["b", "a"]}))).unwrap();
        let text = explain_human(&changes);
        assert!(text.contains("Hint: values are identical but order differs"));
        assert!(text.contains(r#"list_sort_paths = ["$.types"]"#));
    }

    #[test]
    fn test_no_hint_for_real_change() {
        let changes = diff(&v(json!({"types": ["a", "b"]})), &v(json!({"types": ["a", "c"]}))).unwrap();
        assert!(reorder_hint(&changes).is_none());
        assert!(!explain_human(&changes).contains("Hint"));
    }

    #[test]
    fn test_hint_only_names_reordered_groups() {
        let changes = diff(
            &v(json!({"xs": [1, 2], "ys": [1, 2]})),
            &v(json!({"xs": [2, 1], "ys": [3, 4]})),
        )
        .unwrap();
        let hint = reorder_hint(&changes).unwrap();
        assert!(hint.contains("\"$.xs\""));
        assert!(!hint.contains("$.ys"));
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("$.a[12]"), "$.a");
        assert_eq!(parent_path("$.a"), "$.a");
        assert_eq!(parent_path("$[0][1]"), "$[0]");
    }
}
