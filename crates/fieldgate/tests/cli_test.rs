//! Integration tests for the `fieldgate` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and scenario replay, isolated from the user's real
//! configuration.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `fieldgate` binary with env isolation.
///
/// Clears `FIELDGATE_*` overrides and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn fieldgate_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("fieldgate");
    cmd.env("HOME", "/tmp/fieldgate-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/fieldgate-cli-test-nonexistent")
        .env_remove("FIELDGATE_CONFIG")
        .env_remove("FIELDGATE_SEED")
        .env_remove("FIELDGATE_ENGINE__SWEEP_INTERVAL_SECS")
        .env_remove("FIELDGATE_ENGINE__STALE_THRESHOLD_SECS")
        .env_remove("FIELDGATE_ENGINE__CADENCE_TICK_SECS")
        .env_remove("FIELDGATE_ENGINE__DEFAULT_TIMEZONE")
        .env_remove("FIELDGATE_OUTPUT__FORMAT")
        .env_remove("FIELDGATE_OUTPUT__COLOR")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

const HIERARCHY: &str = r#"
    "companies": [{ "id": "acme", "name": "Acme" }],
    "programs": [{ "id": "orchard", "company_id": "acme", "name": "Orchard" }],
    "sites": [{ "id": "north", "program_id": "orchard", "name": "North" }],
    "devices": [
        { "id": "cam-1", "kind": "image_capture", "site_id": "north" },
        { "id": "cam-2", "kind": "image_capture", "site_id": "north" }
    ]"#;

fn scenario(dir: &Path, steps: &str) -> PathBuf {
    write_file(
        dir,
        "scenario.json",
        &format!("{{ {HIERARCHY}, \"steps\": [{steps}] }}"),
    )
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = fieldgate_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    fieldgate_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("replay")
            .and(predicate::str::contains("sweep"))
            .and(predicate::str::contains("cadence"))
            .and(predicate::str::contains("run")),
    );
}

#[test]
fn test_version_flag() {
    fieldgate_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fieldgate"));
}

#[test]
fn test_invalid_subcommand() {
    let output = fieldgate_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_invalid_output_format() {
    fieldgate_cmd()
        .args(["--output", "xml", "cadence", "validate", "--per-day", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("possible values").or(predicate::str::contains("invalid")));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    fieldgate_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    fieldgate_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Cadence ─────────────────────────────────────────────────────────

#[test]
fn test_cadence_validate_reports_interval() {
    let output = fieldgate_cmd()
        .args(["-o", "json", "cadence", "validate", "--per-day", "96"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary = stdout_json(&output);
    assert_eq!(summary["valid"], true);
    assert_eq!(summary["interval_secs"], 900);
    assert_eq!(summary["timezone"], "UTC");
}

#[test]
fn test_cadence_validate_rejects_unlisted_count() {
    fieldgate_cmd()
        .args(["cadence", "validate", "--per-day", "5"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid cadence"));
}

#[test]
fn test_cadence_validate_rejects_disagreeing_fields() {
    fieldgate_cmd()
        .args(["cadence", "validate", "--per-day", "4", "--hours", "5"])
        .assert()
        .code(2);
}

#[test]
fn test_cadence_validate_requires_an_interval() {
    fieldgate_cmd()
        .args(["cadence", "validate", "--tz", "Europe/Berlin"])
        .assert()
        .code(2);
}

#[test]
fn test_cadence_next_quarter_hours() {
    fieldgate_cmd()
        .args([
            "-o",
            "plain",
            "cadence",
            "next",
            "--per-day",
            "96",
            "--from",
            "2024-05-01T00:07:00Z",
            "--count",
            "3",
        ])
        .assert()
        .success()
        .stdout(
            "2024-05-01T00:15:00+00:00\n2024-05-01T00:30:00+00:00\n2024-05-01T00:45:00+00:00\n",
        );
}

#[test]
fn test_cadence_next_restarts_at_midnight() {
    fieldgate_cmd()
        .args([
            "-o",
            "plain",
            "cadence",
            "next",
            "--hours",
            "7",
            "--from",
            "2024-05-01T20:00:00Z",
            "--count",
            "2",
        ])
        .assert()
        .success()
        .stdout("2024-05-01T21:00:00+00:00\n2024-05-02T00:00:00+00:00\n");
}

#[test]
fn test_cadence_next_in_site_timezone() {
    // Tokyo midnight on May 2 is 15:00 UTC on May 1.
    fieldgate_cmd()
        .args([
            "-o",
            "plain",
            "cadence",
            "next",
            "--per-day",
            "1",
            "--tz",
            "Asia/Tokyo",
            "--from",
            "2024-05-01T00:00:00Z",
            "--count",
            "1",
        ])
        .assert()
        .success()
        .stdout("2024-05-01T15:00:00+00:00\n");
}

#[test]
fn test_cadence_next_rejects_bad_timestamp() {
    fieldgate_cmd()
        .args(["cadence", "next", "--per-day", "4", "--from", "noon"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("RFC 3339"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_no_config() {
    // Missing config file falls back to defaults.
    fieldgate_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stale_threshold_secs = 3600"));
}

#[test]
fn test_config_path_honors_flag() {
    fieldgate_cmd()
        .args(["config", "path", "--config", "/tmp/fieldgate-elsewhere/config.toml"])
        .assert()
        .success()
        .stdout("/tmp/fieldgate-elsewhere/config.toml\n");
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/config.toml");
    let path_str = path.to_str().unwrap();

    fieldgate_cmd()
        .args(["config", "init", "--config", path_str])
        .assert()
        .success();
    assert!(path.exists());

    fieldgate_cmd()
        .args(["config", "init", "--config", path_str])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("--force"));

    fieldgate_cmd()
        .args(["config", "init", "--force", "--config", path_str])
        .assert()
        .success();
}

#[test]
fn test_env_overrides_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "config.toml",
        "[engine]\nstale_threshold_secs = 7200\ndefault_timezone = \"Europe/Berlin\"\n",
    );

    let output = fieldgate_cmd()
        .env("FIELDGATE_ENGINE__STALE_THRESHOLD_SECS", "1800")
        .args(["-o", "json", "config", "show", "--config", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cfg = stdout_json(&output);
    assert_eq!(cfg["engine"]["stale_threshold_secs"], 1800);
    assert_eq!(cfg["engine"]["default_timezone"], "Europe/Berlin");
}

#[test]
fn test_config_default_timezone_applies_to_cadence() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "config.toml",
        "[engine]\ndefault_timezone = \"Asia/Tokyo\"\n",
    );
    fieldgate_cmd()
        .args([
            "-o",
            "plain",
            "--config",
            path.to_str().unwrap(),
            "cadence",
            "next",
            "--per-day",
            "1",
            "--from",
            "2024-05-01T00:00:00Z",
            "--count",
            "1",
        ])
        .assert()
        .success()
        .stdout("2024-05-01T15:00:00+00:00\n");
}

#[test]
fn test_unknown_default_timezone_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "config.toml",
        "[engine]\ndefault_timezone = \"Mars/Olympus\"\n",
    );
    fieldgate_cmd()
        .args(["--config", path.to_str().unwrap(), "cadence", "validate", "--per-day", "4"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("default_timezone"));
}

// ── Replay ──────────────────────────────────────────────────────────

#[test]
fn test_replay_reports_each_step() {
    let dir = TempDir::new().unwrap();
    let path = scenario(
        dir.path(),
        r#"
        { "at": "2024-05-01T00:00:00Z", "op": "metadata",
          "device_id": "cam-1", "image_name": "img-1", "total_chunks": 2 },
        { "at": "2024-05-01T00:01:00Z", "op": "chunk",
          "device_id": "cam-1", "image_name": "img-1", "index": 0 },
        { "at": "2024-05-01T00:02:00Z", "op": "metadata",
          "device_id": "cam-1", "image_name": "img-2", "total_chunks": 1 },
        { "at": "2024-05-01T00:03:00Z", "op": "chunk",
          "device_id": "cam-1", "image_name": "img-2", "index": 0, "data": "jpeg" },
        { "at": "2024-05-01T00:04:00Z", "op": "chunk",
          "device_id": "cam-1", "image_name": "img-2", "index": 0 },
        { "at": "2024-05-01T03:00:00Z", "op": "sweep" },
        { "at": "2024-05-01T03:01:00Z", "op": "chunk",
          "device_id": "cam-1", "image_name": "img-1", "index": 1 },
        { "at": "2024-05-01T03:05:00Z", "op": "set_cadence",
          "site_id": "north", "cadence": { "snapshots_per_day": 96 } },
        { "at": "2024-05-01T03:07:00Z", "op": "tick" },
        { "at": "2024-05-01T03:10:00Z", "op": "tick" },
        { "at": "2024-05-01T03:11:00Z", "op": "heartbeat",
          "device_id": "cam-1", "pending_images": 3 },
        { "at": "2024-05-01T03:12:00Z", "op": "chunk",
          "device_id": "cam-9", "image_name": "img-1", "index": 0 }
        "#,
    );

    let output = fieldgate_cmd()
        .args(["-o", "json", "replay", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let results = stdout_json(&output);
    let statuses: Vec<&str> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["status"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        [
            "ok", "ok", "ok", "ok", "ignored", "ok", "ignored", "ok", "ok", "ok", "ok", "failed"
        ]
    );

    let sweep = &results[5];
    assert_eq!(sweep["data"]["cleared"][0]["image"], "img-1");
    assert_eq!(sweep["data"]["cleared"][0]["received_chunks"], 1);
    assert_eq!(results[8]["data"]["issued"][0]["site_id"], "north");
    assert_eq!(results[8]["data"]["issued"][0]["boundary"], "2024-05-01T03:00:00Z");
    assert_eq!(results[9]["data"]["issued"].as_array().unwrap().len(), 0);
    assert_eq!(results[10]["data"]["pending_images"], 3);
}

#[test]
fn test_replay_acknowledges_transmissions() {
    let dir = TempDir::new().unwrap();
    let path = scenario(
        dir.path(),
        r#"
        { "at": "2024-05-01T00:00:00Z", "op": "metadata",
          "device_id": "cam-1", "image_name": "img-1", "total_chunks": 2 },
        { "at": "2024-05-01T00:01:00Z", "op": "chunk",
          "device_id": "cam-1", "image_name": "img-1", "index": 0 },
        { "at": "2024-05-01T00:02:00Z", "op": "ack",
          "device_id": "cam-1", "image_name": "img-1" },
        { "at": "2024-05-01T00:03:00Z", "op": "set_cadence",
          "site_id": "north", "cadence": { "snapshots_per_day": 96 } },
        { "at": "2024-05-01T00:05:00Z", "op": "tick" },
        { "at": "2024-05-01T00:06:00Z", "op": "chunk",
          "device_id": "cam-1", "image_name": "img-1", "index": 1 },
        { "at": "2024-05-01T00:07:00Z", "op": "ack",
          "device_id": "cam-1", "image_name": "img-1" }
        "#,
    );

    let output = fieldgate_cmd()
        .args(["-o", "json", "replay", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let results = stdout_json(&output);
    assert_eq!(results[2]["status"], "ok");
    assert_eq!(results[2]["data"]["missing_chunks"], serde_json::json!([1]));
    assert_eq!(results[6]["status"], "ok");
    assert_eq!(
        results[6]["data"]["ACK_OK"]["next_wake_time"],
        "2024-05-01T00:15:00Z"
    );
}

#[test]
fn test_replay_table_output() {
    let dir = TempDir::new().unwrap();
    let path = scenario(
        dir.path(),
        r#"{ "at": "2024-05-01T00:00:00Z", "op": "metadata",
             "device_id": "cam-1", "image_name": "img-1", "total_chunks": 2 }"#,
    );
    fieldgate_cmd()
        .args(["--color", "never", "replay", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Status")
                .and(predicate::str::contains("metadata"))
                .and(predicate::str::contains("pending")),
        );
}

#[test]
fn test_replay_rejects_malformed_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "broken.json", r#"{ "steps": [{ "op": "reboot" }] }"#);
    fieldgate_cmd()
        .args(["replay", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid scenario"));
}

#[test]
fn test_replay_rejects_orphan_site() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        dir.path(),
        "orphan.json",
        r#"{ "sites": [{ "id": "lost", "program_id": "nowhere", "name": "Lost" }] }"#,
    );
    fieldgate_cmd()
        .args(["replay", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("site 'lost'"));
}

// ── Operator sweep ──────────────────────────────────────────────────

const SWEEP_STEPS: &str = r#"
    { "at": "2024-05-01T00:00:00Z", "op": "metadata",
      "device_id": "cam-1", "image_name": "img-1", "total_chunks": 2 },
    { "at": "2024-05-01T00:10:00Z", "op": "chunk",
      "device_id": "cam-1", "image_name": "img-1", "index": 0 },
    { "at": "2024-05-01T00:00:00Z", "op": "metadata",
      "device_id": "cam-2", "image_name": "img-9", "total_chunks": 4 }
"#;

#[test]
fn test_sweep_clears_only_named_device() {
    let dir = TempDir::new().unwrap();
    let path = scenario(dir.path(), SWEEP_STEPS);

    let output = fieldgate_cmd()
        .args([
            "-o",
            "json",
            "sweep",
            "--scenario",
            path.to_str().unwrap(),
            "--device",
            "cam-1",
            "--at",
            "2024-05-01T02:00:00Z",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let result = stdout_json(&output);
    assert_eq!(result["count"], 1);
    let cleared = &result["cleared_images"][0];
    assert_eq!(cleared["device"], "CAM-1");
    assert_eq!(cleared["image"], "img-1");
    assert_eq!(cleared["received_chunks"], 1);
    assert_eq!(cleared["total_chunks"], 2);
    assert_eq!(cleared["age_minutes"], 110);
}

#[test]
fn test_sweep_age_threshold_is_respected() {
    let dir = TempDir::new().unwrap();
    let path = scenario(dir.path(), SWEEP_STEPS);

    let output = fieldgate_cmd()
        .args([
            "-o",
            "json-compact",
            "sweep",
            "--scenario",
            path.to_str().unwrap(),
            "--device",
            "cam-1",
            "--age-hours",
            "3",
            "--at",
            "2024-05-01T02:00:00Z",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"{"count":0,"cleared_images":[]}"#
    );
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_emits_snapshot_commands_until_duration() {
    let dir = TempDir::new().unwrap();
    let seed = write_file(
        dir.path(),
        "seed.toml",
        r#"
[[companies]]
id = "acme"
name = "Acme"

[[programs]]
id = "orchard"
company_id = "acme"
name = "Orchard"

[[sites]]
id = "north"
program_id = "orchard"
name = "North"
cadence = { snapshots_per_day = 96 }

[[devices]]
id = "cam-1"
kind = "image_capture"
site_id = "north"
"#,
    );

    fieldgate_cmd()
        .env("FIELDGATE_ENGINE__CADENCE_TICK_SECS", "1")
        .args([
            "run",
            "--seed",
            seed.to_str().unwrap(),
            "--duration",
            "2500ms",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("snapshot_requested")
                .and(predicate::str::contains("north")),
        );
}

#[test]
fn test_run_rejects_bad_seed() {
    let dir = TempDir::new().unwrap();
    let seed = write_file(
        dir.path(),
        "seed.toml",
        "[[devices]]\nid = \"cam-1\"\nkind = \"image_capture\"\nsite_id = \"nowhere\"\n",
    );
    fieldgate_cmd()
        .args(["run", "--seed", seed.to_str().unwrap(), "--duration", "1s"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("device 'CAM-1'"));
}

#[test]
fn test_run_rejects_bad_duration() {
    fieldgate_cmd()
        .args(["run", "--duration", "soon"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("duration"));
}
