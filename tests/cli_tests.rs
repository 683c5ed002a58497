//! Integration tests for argument and configuration handling
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use predicates::prelude::*;
use std::fs;

#[test]
fn test_help_lists_revisions() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfbisect");
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("<GOOD>"))
        .stdout(predicate::str::contains("<BAD>"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_missing_revisions_is_usage_error() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfbisect");

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_missing_config_file() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfbisect");
    cmd.arg("--config")
        .arg("/nonexistent/perfbisect.toml")
        .arg("good")
        .arg("bad");

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_invalid_threshold_in_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("perfbisect.toml");
    fs::write(&config, "threshold_seconds = -1.0\n").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfbisect");
    cmd.arg("-c").arg(&config).arg("good").arg("bad");

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("threshold_seconds"));
}

#[test]
fn test_threshold_override_is_validated() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfbisect");
    cmd.arg("--log-dir")
        .arg(dir.path())
        .arg("--threshold")
        .arg("0")
        .arg("good")
        .arg("bad");

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("threshold_seconds"));
}

#[test]
fn test_metric_pattern_without_capture_group() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("perfbisect.toml");
    fs::write(&config, "metric_pattern = 'renderBlobsToTexture'\n").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfbisect");
    cmd.arg("-c").arg(&config).arg("good").arg("bad");

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("capture group"));
}

#[test]
fn test_unknown_config_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("perfbisect.toml");
    fs::write(&config, "primary_tree = '/work/slang'\n").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("perfbisect");
    cmd.arg("-c").arg(&config).arg("good").arg("bad");

    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid config"));
}
