//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the ms-executor binary
fn executor_cmd() -> Command {
    let mut cmd = Command::cargo_bin("ms-executor").unwrap();
    cmd.env("MSEXEC_PENDING_SCAN_INTERVAL_MS", "5");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    executor_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("session executor"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    executor_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ms-session-executor"))
        .stdout(predicate::str::contains("Build Information"))
        .stdout(predicate::str::contains("Git Hash"))
        .stdout(predicate::str::contains("Executor Defaults"));
}

#[test]
fn test_version_json() {
    executor_cmd()
        .args(["version", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"ms-session-executor\""))
        .stdout(predicate::str::contains("\"max_inflight_async_runs\": 64"));
}

#[test]
fn test_short_version_flag() {
    executor_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ms-executor"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    executor_cmd()
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("[executor]"))
        .stdout(predicate::str::contains("[workload]"))
        .stdout(predicate::str::contains("[logging]"));
}

#[test]
fn test_config_validate_fixture() {
    executor_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(common::valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_invalid_fixture() {
    executor_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(common::invalid_config_fixture())
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("E102"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    executor_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg("/nonexistent/path/config.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("config init"));
}

#[test]
fn test_config_init_writes_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    executor_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));
    assert!(path.exists());

    // A second init without --force refuses to overwrite
    executor_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    executor_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────
// Run Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_run_help() {
    executor_cmd()
        .arg("run")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--graphs"))
        .stdout(predicate::str::contains("--steps"))
        .stdout(predicate::str::contains("--async"));
}

#[test]
fn test_run_async_workload() {
    executor_cmd()
        .args(["run", "--graphs", "2", "--steps", "3", "--async"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Workload complete"))
        .stdout(predicate::str::contains("Runs:          6"))
        .stdout(predicate::str::contains("created=true destroyed=true"));
}

#[test]
fn test_run_json_report() {
    executor_cmd()
        .args(["--quiet", "run", "--graphs", "1", "--steps", "2", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"step_outputs\""))
        .stdout(predicate::str::contains("\"worker_state\": \"terminated\""));
}

#[test]
fn test_run_with_invalid_config() {
    executor_cmd()
        .arg("run")
        .arg("--config")
        .arg("/nonexistent/config.toml")
        .assert()
        .failure()
        .code(10);
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Flag Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag() {
    executor_cmd().arg("-v").arg("version").assert().success();
}

#[test]
fn test_quiet_flag() {
    executor_cmd().arg("--quiet").arg("version").assert().success();
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    executor_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    executor_cmd().assert().failure();
}
