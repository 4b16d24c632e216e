//! End-to-end tests for the catalog-ingest binary

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn catalog_ingest(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catalog-ingest").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("CATALOG_CONFIG")
        .env_remove("CATALOG_OUTPUT")
        .env_remove("CATALOG_OUTPUT_ERROR")
        .env_remove("CATALOG_MASTER_LOG")
        .env_remove("CATALOG_LOG_OUTPUT");
    cmd
}

#[test]
fn test_inline_records_are_written() {
    let dir = TempDir::new().unwrap();
    let config = json!({"records": [
        {"code": "CSC108", "name": "Introduction to Programming",
         "sections": [{"section": "L0101", "year": 2020, "term": "fall",
                       "meetings": [{"day": "M", "time_start": "10:00", "time_end": "11:00"}]}]}
    ]});

    catalog_ingest(&dir)
        .args(["--school", "uoft", "--config"])
        .arg(config.to_string())
        .args(["--output", "out/{school}-{type}.json"])
        .args(["--output-error", "out/{school}-{type}-errors.json"])
        .args(["--master-log", "master.log"])
        .assert()
        .success();

    let output = std::fs::read_to_string(dir.path().join("out/uoft-courses.json")).unwrap();
    assert!(output.contains("CSC108"));
    let log = std::fs::read_to_string(dir.path().join("master.log")).unwrap();
    assert!(log.contains("errors: 0"));
}

#[test]
fn test_failed_school_does_not_fail_the_process() {
    let dir = TempDir::new().unwrap();

    catalog_ingest(&dir)
        .args(["--school", "jhu", "--school", "umd"])
        .args(["--config", r#"{"records": [7]}"#])
        .args(["--output", "out/{school}.json"])
        .args(["--master-log", "master.log"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Error while parsing jhu:"))
        .stderr(predicate::str::contains("Error while parsing umd:"));
}

#[test]
fn test_unknown_school_exits_with_error() {
    let dir = TempDir::new().unwrap();

    catalog_ingest(&dir)
        .args(["--school", "mit", "--master-log", "master.log"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unknown school 'mit'"));

    assert!(!dir.path().join("master.log").exists());
}

#[test]
fn test_rejects_unknown_data_type() {
    let dir = TempDir::new().unwrap();

    catalog_ingest(&dir)
        .args(["--school", "jhu", "--type", "grades"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("grades"));
}
