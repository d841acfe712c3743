//! End-to-end tests for the qase-report binary.

#![allow(deprecated)]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::tempdir;

const QASE_VARS: &[&str] = &[
    "QASE_API_BASE_URL",
    "QASE_API_TOKEN",
    "QASE_BATCH_SIZE",
    "QASE_ENVIRONMENT_ID",
    "QASE_FALLBACK",
    "QASE_LOGGING",
    "QASE_MODE",
    "QASE_PROJECT_CODE",
    "QASE_REPORT",
    "QASE_RUN_COMPLETE",
    "QASE_RUN_DESCRIPTION",
    "QASE_RUN_ID",
    "QASE_RUN_NAME",
];

const JUNIT: &str = r#"<?xml version="1.0"?>
<testsuite name="auth">
  <testcase classname="login" name="accepts valid password (Qase ID: 3)" time="0.1"/>
  <testcase classname="login" name="rejects bad password" time="0.2">
    <failure message="got 200">assertion failed</failure>
  </testcase>
</testsuite>"#;

fn qase(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("qase-report").expect("cargo bin");
    cmd.current_dir(dir);
    for var in QASE_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
#[serial]
fn test_init_writes_config_once() {
    let dir = tempdir().unwrap();

    qase(dir.path())
        .args(["init", "--project", "SHOP"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created qase.toml"));

    let written = fs::read_to_string(dir.path().join("qase.toml")).unwrap();
    assert!(written.contains("project = \"SHOP\""));

    qase(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    qase(dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
#[serial]
fn test_validate_reports_missing_token() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("qase.toml"),
        "mode = \"testops\"\n[testops]\nproject = \"SHOP\"\n",
    )
    .unwrap();

    qase(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("API token"));

    qase(dir.path())
        .arg("validate")
        .env("QASE_API_TOKEN", "secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid!"))
        .stdout(predicate::str::contains("Project: SHOP"));
}

#[test]
#[serial]
fn test_malformed_config_is_an_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("qase.toml"), "mode = [").unwrap();

    qase(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
#[serial]
fn test_import_in_report_mode_writes_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("junit.xml"), JUNIT).unwrap();

    qase(dir.path())
        .args(["import", "junit.xml", "--mode", "report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published 2/2 results"));

    let report = dir.path().join("build/qase-report");
    let results = fs::read_dir(report.join("results")).unwrap().count();
    assert_eq!(results, 2);

    let run: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(report.join("run.json")).unwrap()).unwrap();
    assert_eq!(run["stats"]["passed"], 1);
    assert_eq!(run["stats"]["failed"], 1);
}

#[test]
#[serial]
fn test_import_missing_file_fails() {
    let dir = tempdir().unwrap();

    qase(dir.path())
        .args(["import", "nope.xml", "--mode", "report"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to import nope.xml"));
}

#[test]
#[serial]
fn test_unreachable_testops_does_not_fail_import() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("junit.xml"), JUNIT).unwrap();
    fs::write(
        dir.path().join("qase.toml"),
        "[testops.retry]\nmax_retries = 0\n",
    )
    .unwrap();

    qase(dir.path())
        .args(["import", "junit.xml", "--mode", "testops"])
        .env("QASE_API_TOKEN", "secret")
        .env("QASE_PROJECT_CODE", "SHOP")
        .env("QASE_API_BASE_URL", "http://127.0.0.1:9/v1")
        .assert()
        .success();
}
