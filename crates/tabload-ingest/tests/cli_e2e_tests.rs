//! End-to-end tests for the tabload binary
//!
//! These validate the command-line workflow including:
//! - Loading with flags, a config file, and environment overrides
//! - Human and JSON output
//! - Exit codes on fatal errors
//! - The status command

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_csv(dir: &Path, rows: usize) -> PathBuf {
    let path = dir.join("data.csv");
    let mut content = String::from("id,name,amount\n");
    for i in 1..=rows {
        content.push_str(&format!("{},name_{},{}\n", i, i, i * 10));
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// A command running in `dir`, isolated from the caller's TABLOAD_* settings
fn tabload(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tabload").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("TABLOAD_CONFIG")
        .env_remove("TABLOAD_SOURCE_PATH")
        .env_remove("TABLOAD_SINK_PATH")
        .env_remove("TABLOAD_TABLE_NAME")
        .env_remove("TABLOAD_BATCH_SIZE")
        .env_remove("TABLOAD_BUSY_TIMEOUT_MS");
    cmd
}

// ============================================================================
// Load
// ============================================================================

#[test]
fn test_load_prints_summary_and_preview() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), 12);
    let sink = dir.path().join("out").join("analytics.db");

    tabload(&dir)
        .arg("load")
        .arg("--source")
        .arg(&source)
        .arg("--sink")
        .arg(&sink)
        .arg("--batch-size")
        .arg("5")
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 12 rows into 'analytics_data' (3 batches)"))
        .stdout(predicate::str::contains("Verified:   12 rows in table"))
        .stdout(predicate::str::contains("First 5 rows:"))
        .stdout(predicate::str::contains("name_5"))
        .stdout(predicate::str::contains("name_6").not())
        .stdout(predicate::str::contains("WARNING").not());

    assert!(sink.exists());
}

#[test]
fn test_load_json_report() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), 7);
    let sink = dir.path().join("analytics.db");

    let output = tabload(&dir)
        .args(["load", "--json", "--table", "sales", "-b", "3"])
        .arg("--source")
        .arg(&source)
        .arg("--sink")
        .arg(&sink)
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["table_name"], "sales");
    assert_eq!(report["rows_written"], 7);
    assert_eq!(report["batches_processed"], 3);
    assert_eq!(report["verification"]["status"], "matched");
}

#[test]
fn test_load_from_config_file_with_policy() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("raw.csv"),
        "old_column_1,numeric_column\na,1\nb,\nc,3\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("tabload.toml"),
        r#"
        source_path = "raw.csv"
        sink_path = "processed/analytics.db"

        [[policy.rules]]
        rule = "rename"
        from = "old_column_1"
        to = "new_column_1"

        [[policy.rules]]
        rule = "impute_median"
        column = "numeric_column"

        [[policy.rules]]
        rule = "impute_constant"
        column = "region"
        "#,
    )
    .unwrap();

    tabload(&dir)
        .args(["load", "--config", "tabload.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("new_column_1"))
        .stdout(predicate::str::contains("Skipped rules: 1"))
        .stdout(predicate::str::contains("Imputed:    1 cell(s) in 'numeric_column'"));

    assert!(dir.path().join("processed").join("analytics.db").exists());
}

#[test]
fn test_environment_overrides_batch_size() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), 4);

    let output = tabload(&dir)
        .env("TABLOAD_BATCH_SIZE", "2")
        .env("TABLOAD_SINK_PATH", "env.db")
        .args(["load", "--json"])
        .arg("--source")
        .arg(&source)
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["batches_processed"], 2);
    assert!(dir.path().join("env.db").exists());
}

#[test]
fn test_load_missing_source_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let sink = dir.path().join("analytics.db");

    tabload(&dir)
        .args(["load", "--source", "nope.csv"])
        .arg("--sink")
        .arg(&sink)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Source not found"));

    assert!(!sink.exists());
}

#[test]
fn test_load_without_paths_is_config_error() {
    let dir = TempDir::new().unwrap();

    tabload(&dir)
        .arg("load")
        .assert()
        .failure()
        .stderr(predicate::str::contains("source_path is required"));
}

#[test]
fn test_load_rejects_zero_batch_size() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), 1);

    tabload(&dir)
        .args(["load", "--batch-size", "0", "--sink", "a.db"])
        .arg("--source")
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size must be at least 1"));
}

#[test]
fn test_load_wide_row_reports_batch() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bad.csv"), "a,b\n1,2\n3,4,5\n").unwrap();

    tabload(&dir)
        .args(["load", "--source", "bad.csv", "--sink", "bad.db", "-b", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Ingestion failed"))
        .stderr(predicate::str::contains("batch 1"));
}

// ============================================================================
// Status
// ============================================================================

#[test]
fn test_status_after_load() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(dir.path(), 3);

    tabload(&dir)
        .args(["load", "--sink", "a.db", "--no-preview"])
        .arg("--source")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("First 5 rows:").not());

    tabload(&dir)
        .args(["status", "--sink", "a.db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("complete"))
        .stdout(predicate::str::contains("In table: 3"));
}

#[test]
fn test_status_missing_database() {
    let dir = TempDir::new().unwrap();

    tabload(&dir)
        .args(["status", "--sink", "missing.db"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_no_subcommand_shows_help() {
    let dir = TempDir::new().unwrap();

    tabload(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
