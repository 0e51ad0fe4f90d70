use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("calibra.yaml");
    std::fs::write(
        &config,
        "version: 1\ndb: calibra.db\nproviders:\n  fake: [echo, lossy, upper]\nsettings:\n  parallel: 2\n  timeout_seconds: 5\n",
    )
    .unwrap();
    (dir, config)
}

fn calibra(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("calibra").unwrap();
    cmd.env_remove("CALIBRA_DB")
        .env_remove("CALIBRA_CONFIG")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn test_dataset_comparison_completes() {
    let (dir, config) = workspace();
    let cases = dir.path().join("cases.jsonl");
    std::fs::write(
        &cases,
        concat!(
            r#"{"input_text": "title: One\ncity: Oslo", "expected_extraction": {"title": "One", "city": "Oslo"}}"#,
            "\n",
            r#"{"input_text": "title: Two\ncity: Rome", "expected_extraction": {"title": "Two", "city": "Rome"}}"#,
            "\n",
        ),
    )
    .unwrap();

    calibra(&config)
        .args(["dataset", "create", "--name", "smoke"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"smoke\""));
    calibra(&config)
        .args(["dataset", "import", "--dataset", "1", "--file"])
        .arg(&cases)
        .assert()
        .success();

    let out = calibra(&config)
        .args([
            "compare",
            "--config-a",
            "fake/echo",
            "--config-b",
            "fake/lossy",
            "--dataset",
            "1",
            "--iterations",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"completed\""))
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(out).unwrap();
    let re = regex::Regex::new(r#""comparison_id":(\d+)"#).unwrap();
    let id = re.captures(&stdout).unwrap()[1].to_string();
    assert_eq!(id, "1");

    calibra(&config)
        .args(["status", "--comparison", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"progress\": 8"))
        .stdout(predicate::str::contains("\"winner\""));

    calibra(&config)
        .arg("comparisons")
        .assert()
        .success()
        .stdout(predicate::str::contains("1\tdataset\tcompleted\t8/8\tfake/echo vs fake/lossy"));

    calibra(&config)
        .args(["trials", "--comparison", "1", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"case_id\": 1"));
}

#[test]
fn test_calibration_review_and_export() {
    let (dir, config) = workspace();
    let docs = dir.path().join("docs.jsonl");
    std::fs::write(
        &docs,
        concat!(
            r#"{"source": "wire", "text": "title: Alpha\ncity: Paris"}"#,
            "\n",
            r#"{"source": "wire", "text": "title: Beta\ncity: Lyon"}"#,
            "\n",
        ),
    )
    .unwrap();

    calibra(&config)
        .args(["docs", "import", "--file"])
        .arg(&docs)
        .assert()
        .success()
        .stderr(predicate::str::contains("Imported 2 documents"));

    calibra(&config)
        .args([
            "compare",
            "--mode",
            "calibration",
            "--config-a",
            "fake/echo",
            "--config-b",
            "fake/upper",
            "--count",
            "2",
            "--quiet",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"completed\""));

    calibra(&config)
        .args(["diff", "--comparison", "1", "--document", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("city"));

    calibra(&config)
        .args([
            "review",
            "--comparison",
            "1",
            "--document",
            "1",
            "--prefer",
            "city=b",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("PARIS"))
        .stdout(predicate::str::contains("\"reviewed_count\": 1"));

    calibra(&config)
        .args(["export", "--comparison", "1", "--name", "calibrated"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"case_count\": 1"));

    calibra(&config)
        .args(["export", "--comparison", "1", "--name", "again"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("already exported"));
}

#[test]
fn test_unknown_model_is_a_config_error() {
    let (_dir, config) = workspace();
    calibra(&config)
        .args([
            "compare",
            "--config-a",
            "fake/echo",
            "--config-b",
            "fake/gpt-9",
            "--dataset",
            "1",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("gpt-9"));
}

#[test]
fn test_missing_config_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    calibra(&dir.path().join("nope.yaml"))
        .args(["status", "--comparison", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to read config"));
}

#[test]
fn test_init_writes_sample_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("calibra.yaml");

    calibra(&config).arg("init").assert().success();
    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("providers:"));

    std::fs::write(&config, "custom: true\n").unwrap();
    calibra(&config)
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(std::fs::read_to_string(&config).unwrap(), "custom: true\n");
}

#[test]
fn test_db_override_is_relative_to_config_dir() {
    let (dir, config) = workspace();
    let elsewhere = tempfile::tempdir().unwrap();

    calibra(&config)
        .current_dir(elsewhere.path())
        .env("CALIBRA_DB", "state/override.db")
        .args(["dataset", "list"])
        .assert()
        .success();

    assert!(dir.path().join("state/override.db").exists());
    assert!(!elsewhere.path().join("state").exists());
}
