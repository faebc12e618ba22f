//! Command implementations.
//!
//! Each command writes its report to `out` and returns the process exit
//! code: 0 success, 1 regressions or differences. Errors map to exit code 2
//! in `main`.

use crate::config::ShadowConfig;
use crate::output::{pretty_json, render_report, CliError};
use anyhow::{Context, Result};
use shadow_core::{fingerprint, ShadowError, SystemClock, Value, ENGINE_VERSION};
use shadow_diff::{explain_human, prepare, summarize, DiffEngine};
use shadow_governance::{baseline_file_name, file_name, load_capture, record_paths, RecordStore};
use shadow_replay::Replayer;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replay the shadow directory against the baselines
///
/// # Errors
///
/// Fails when there are no baselines or replay loading fails
pub fn verify(
    config: &ShadowConfig,
    capture_dir: Option<&Path>,
    as_json: bool,
    verbose: bool,
    out: &mut dyn Write,
) -> Result<i32> {
    if record_paths(&config.baseline_dir)?.is_empty() {
        return Err(CliError::NoBaseline {
            dir: config.baseline_dir.display().to_string(),
        }
        .into());
    }
    let capture_dir = capture_dir.unwrap_or(config.shadow_dir.as_path());
    let report = Replayer::new(&config.baseline_dir, capture_dir)
        .with_diff_policy(config.diff_policy()?)
        .with_governance_policy(config.governance_policy()?)
        .with_limits(config.limits())
        .replay()?;

    if as_json {
        let ci = report.ci_report(&SystemClock, ENGINE_VERSION);
        out.write_all(pretty_json(&serde_json::to_value(&ci)?).as_bytes())?;
    } else {
        out.write_all(render_report(&report, verbose).as_bytes())?;
    }
    Ok(report.exit_code())
}

/// Promote every capture into an approved baseline
///
/// Unreadable captures are skipped with a warning.
///
/// # Errors
///
/// Fails on governance configuration or filesystem errors
pub fn record(config: &ShadowConfig, out: &mut dyn Write) -> Result<i32> {
    let governor = config.governor()?;
    let store = RecordStore::with_limits(&config.baseline_dir, config.limits());
    let limits = config.limits();

    let mut saved = 0usize;
    for path in record_paths(&config.shadow_dir)? {
        let capture = match load_capture(&path, &limits) {
            Ok(capture) => capture,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable capture");
                continue;
            }
        };
        store.save(&governor.create_from_capture(capture.scenario))?;
        saved += 1;
    }

    writeln!(
        out,
        "Baseline recorded: {} scenarios saved to {}/",
        saved,
        config.baseline_dir.display()
    )?;
    Ok(0)
}

/// Split an approve target into (`module.function`, fingerprint)
///
/// # Errors
///
/// Returns [`CliError::BadTarget`] when neither form matches
pub fn parse_target(identifier: &str, semantic_id: Option<&str>) -> Result<(String, String), CliError> {
    if let Some(id) = semantic_id.filter(|id| !id.is_empty()) {
        return Ok((identifier.to_string(), id.to_string()));
    }
    match identifier.split_once(':') {
        Some((path, id)) if !path.is_empty() && !id.is_empty() => {
            Ok((path.to_string(), id.to_string()))
        }
        _ => Err(CliError::BadTarget(identifier.to_string())),
    }
}

/// Newest capture file for a scenario in `dir`
///
/// # Errors
///
/// Returns `Io` if the directory cannot be listed
pub fn newest_capture(dir: &Path, function_path: &str, id: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{}_{}_", function_path, id);
    Ok(record_paths(dir)?
        .into_iter()
        .filter(|path| file_name(path).starts_with(&prefix))
        .max())
}

/// Approve the newest capture of a scenario into the baselines
///
/// # Errors
///
/// Fails when no capture exists or governance denies the approval
pub fn approve(
    config: &ShadowConfig,
    identifier: &str,
    semantic_id: Option<&str>,
    out: &mut dyn Write,
) -> Result<i32> {
    let (function_path, id) = parse_target(identifier, semantic_id)?;
    let capture_path = newest_capture(&config.shadow_dir, &function_path, &id)?.ok_or_else(|| {
        ShadowError::scenario_not_found(format!(
            "No recent capture found for {} with ID {}",
            function_path, id
        ))
    })?;

    let capture = load_capture(&capture_path, &config.limits())?;
    let baseline_path = config
        .baseline_dir
        .join(baseline_file_name(&capture.scenario.key()));
    let record = config
        .governor()?
        .approve_path(&baseline_path, capture.scenario, &config.limits())?;

    writeln!(
        out,
        "Approved change for {} ({}). Baseline updated (version={}).",
        function_path, id, record.metadata.version_id
    )?;
    Ok(0)
}

/// List baselines with their governance metadata
///
/// # Errors
///
/// Fails on the first invalid record
pub fn baseline_list(config: &ShadowConfig, out: &mut dyn Write) -> Result<i32> {
    if !config.baseline_dir.exists() {
        writeln!(out, "No baseline directory found.")?;
        return Ok(0);
    }
    let store = RecordStore::with_limits(&config.baseline_dir, config.limits());
    for row in store.list()? {
        writeln!(
            out,
            "{} status={} version={}",
            row.scenario_id, row.metadata.status, row.metadata.version_id
        )?;
    }
    Ok(0)
}

/// Print one baseline record as JSON
///
/// # Errors
///
/// Returns `ScenarioNotFound` or load errors
pub fn baseline_show(config: &ShadowConfig, scenario_id: &str, out: &mut dyn Write) -> Result<i32> {
    let store = RecordStore::with_limits(&config.baseline_dir, config.limits());
    let record = store.load(&store.find(scenario_id)?)?;
    out.write_all(pretty_json(&record.to_value().to_json()).as_bytes())?;
    Ok(0)
}

/// Deprecate one baseline
///
/// # Errors
///
/// Returns `ScenarioNotFound`, load errors, or governance errors
pub fn baseline_deprecate(
    config: &ShadowConfig,
    scenario_id: &str,
    out: &mut dyn Write,
) -> Result<i32> {
    let store = RecordStore::with_limits(&config.baseline_dir, config.limits());
    let path = store.find(scenario_id)?;
    let record = config.governor()?.deprecate_path(&path, &config.limits())?;
    writeln!(
        out,
        "Deprecated {} (version={})",
        scenario_id, record.metadata.version_id
    )?;
    Ok(0)
}

/// Print the fingerprint of a JSON document
///
/// # Errors
///
/// Fails if the file cannot be read or parsed
pub fn fingerprint_file(path: &Path, out: &mut dyn Write) -> Result<i32> {
    let value = read_json(path)?;
    writeln!(out, "{}", fingerprint(&value))?;
    Ok(0)
}

/// Diff two JSON documents under the configured policy
///
/// # Errors
///
/// Fails if either file cannot be read or parsed
pub fn diff_files(
    config: &ShadowConfig,
    baseline: &Path,
    current: &Path,
    as_json: bool,
    out: &mut dyn Write,
) -> Result<i32> {
    let policy = config.diff_policy()?;
    let b = prepare(&read_json(baseline)?, &policy);
    let c = prepare(&read_json(current)?, &policy);
    let changes = DiffEngine::default().diff(&b, &c)?;

    if as_json {
        out.write_all(pretty_json(&serde_json::to_value(&changes)?).as_bytes())?;
    } else {
        writeln!(out, "{}", summarize(&changes))?;
        writeln!(out, "{}", explain_human(&changes))?;
    }
    Ok(i32::from(!changes.is_empty()))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| ShadowError::io(path.display(), &e))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shadow_core::Map;
    use shadow_governance::{capture_file_name, CaptureOutput, CaptureScenario, ScenarioStatus};
    use tempfile::TempDir;

    struct Workspace {
        _root: TempDir,
        config: ShadowConfig,
    }

    fn workspace() -> Workspace {
        let root = TempDir::new().unwrap();
        let config = ShadowConfig {
            baseline_dir: root.path().join("baseline"),
            shadow_dir: root.path().join("shadow"),
            ..ShadowConfig::default()
        };
        fs::create_dir_all(&config.shadow_dir).unwrap();
        Workspace {
            _root: root,
            config,
        }
    }

    fn scenario(out: i64) -> CaptureScenario {
        let mut input = Map::new();
        input.insert("sku".to_string(), Value::from("A-1"));
        CaptureScenario::new("shop", "price", input, CaptureOutput::success(out))
    }

    fn write_capture(dir: &Path, s: &CaptureScenario, second: u32) -> PathBuf {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, second).unwrap();
        let path = dir.join(capture_file_name(&s.key(), at));
        fs::write(&path, pretty_json(&s.to_value().to_json())).unwrap();
        path
    }

    fn run<F>(f: F) -> (i32, String)
    where
        F: FnOnce(&mut dyn Write) -> Result<i32>,
    {
        let mut buf = Vec::new();
        let code = f(&mut buf).unwrap();
        (code, String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_parse_target_forms() {
        assert_eq!(
            parse_target("shop.price:abc", None).unwrap(),
            ("shop.price".to_string(), "abc".to_string())
        );
        assert_eq!(
            parse_target("shop.price", Some("abc")).unwrap(),
            ("shop.price".to_string(), "abc".to_string())
        );
        assert!(parse_target("shop.price", None).is_err());
        assert!(parse_target(":abc", None).is_err());
    }

    #[test]
    fn test_record_then_verify_clean() {
        let ws = workspace();
        write_capture(&ws.config.shadow_dir, &scenario(10), 0);
        fs::write(ws.config.shadow_dir.join("broken.json"), "{").unwrap();

        let (code, text) = run(|out| record(&ws.config, out));
        assert_eq!(code, 0);
        assert!(text.starts_with("Baseline recorded: 1 scenarios"));
        fs::remove_file(ws.config.shadow_dir.join("broken.json")).unwrap();

        let (code, text) = run(|out| verify(&ws.config, None, false, false, out));
        assert_eq!(code, 0, "{}", text);
        assert!(text.contains("PASS: shop.price:"));
    }

    #[test]
    fn test_verify_without_baselines_fails() {
        let ws = workspace();
        let mut buf = Vec::new();
        let err = verify(&ws.config, None, false, false, &mut buf).unwrap_err();
        assert!(err.downcast_ref::<CliError>().is_some());
    }

    #[test]
    fn test_regression_then_approve() {
        let ws = workspace();
        let capture_dir = ws.config.shadow_dir.join("run");
        fs::create_dir_all(&capture_dir).unwrap();
        write_capture(&ws.config.shadow_dir, &scenario(10), 0);
        run(|out| record(&ws.config, out));

        write_capture(&capture_dir, &scenario(12), 1);
        let (code, text) = run(|out| verify(&ws.config, Some(&capture_dir), true, false, out));
        assert_eq!(code, 1);
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["summary"]["mismatch_count"], 1);
        assert_eq!(json["exit_code"], 1);

        write_capture(&ws.config.shadow_dir, &scenario(12), 2);
        let key = scenario(12).key();
        let (code, text) = run(|out| approve(&ws.config, key.as_str(), None, out));
        assert_eq!(code, 0);
        assert!(text.starts_with("Approved change for shop.price"));

        let (code, _) = run(|out| verify(&ws.config, Some(&capture_dir), false, false, out));
        assert_eq!(code, 0);
    }

    #[test]
    fn test_newest_capture_wins() {
        let ws = workspace();
        let s = scenario(1);
        write_capture(&ws.config.shadow_dir, &s, 5);
        let newest = write_capture(&ws.config.shadow_dir, &s, 9);
        let found = newest_capture(&ws.config.shadow_dir, "shop.price", &s.fingerprint)
            .unwrap()
            .unwrap();
        assert_eq!(found, newest);
    }

    #[test]
    fn test_approve_without_capture_fails() {
        let ws = workspace();
        let mut buf = Vec::new();
        let err = approve(&ws.config, "shop.price:nothing", None, &mut buf).unwrap_err();
        let shadow = err.downcast_ref::<ShadowError>().unwrap();
        assert_eq!(shadow.code(), "SCENARIO_NOT_FOUND");
    }

    #[test]
    fn test_baseline_list_show_deprecate() {
        let ws = workspace();
        write_capture(&ws.config.shadow_dir, &scenario(3), 0);
        run(|out| record(&ws.config, out));
        let key = scenario(3).key();

        let (_, text) = run(|out| baseline_list(&ws.config, out));
        assert!(text.contains(&format!("{} status=approved", key)));

        let (_, text) = run(|out| baseline_show(&ws.config, key.as_str(), out));
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["metadata"]["scenario_status"], "approved");

        let (code, text) = run(|out| baseline_deprecate(&ws.config, key.as_str(), out));
        assert_eq!(code, 0);
        assert!(text.starts_with(&format!("Deprecated {}", key)));
        let store = RecordStore::new(&ws.config.baseline_dir);
        let record = store.load(&store.find(key.as_str()).unwrap()).unwrap();
        assert_eq!(record.status(), ScenarioStatus::Deprecated);

        let mut buf = Vec::new();
        let err = baseline_show(&ws.config, "shop.price:missing", &mut buf).unwrap_err();
        assert!(err.downcast_ref::<ShadowError>().is_some());
    }

    #[test]
    fn test_baseline_list_without_dir() {
        let ws = workspace();
        let (code, text) = run(|out| baseline_list(&ws.config, out));
        assert_eq!(code, 0);
        assert_eq!(text, "No baseline directory found.\n");
    }

    #[test]
    fn test_fingerprint_and_diff_files() {
        let ws = workspace();
        let a = ws.config.shadow_dir.join("a.json");
        let b = ws.config.shadow_dir.join("b.json");
        fs::write(&a, r#"{"x": 1, "y": [1, 2]}"#).unwrap();
        fs::write(&b, r#"{"y": [1, 2], "x": 1}"#).unwrap();

        let (_, fa) = run(|out| fingerprint_file(&a, out));
        let (_, fb) = run(|out| fingerprint_file(&b, out));
        assert_eq!(fa, fb);
        assert_eq!(fa.trim().len(), 32);

        let (code, _) = run(|out| diff_files(&ws.config, &a, &b, false, out));
        assert_eq!(code, 0);

        fs::write(&b, r#"{"x": 2, "y": [1, 2]}"#).unwrap();
        let (code, text) = run(|out| diff_files(&ws.config, &a, &b, true, out));
        assert_eq!(code, 1);
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json[0]["path"], "$.x");
    }
}
