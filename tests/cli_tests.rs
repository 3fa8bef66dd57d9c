//! CLI smoke tests for the `shipyard` binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a shipyard Command isolated from the caller's environment.
fn shipyard() -> Command {
    let mut cmd = cargo_bin_cmd!("shipyard");
    for var in [
        "SHIPYARD_PORT",
        "SHIPYARD_DB_PATH",
        "SHIPYARD_BUILDER_URL",
        "SHIPYARD_WEBDRIVER_URL",
        "LLM_MODEL",
        "SHIPYARD_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_stub_config(dir: &TempDir) {
    fs::write(
        dir.path().join("shipyard.toml"),
        r#"
[builder]
kind = "stub"

[llm]
api_key_env = "SHIPYARD_CLI_TEST_MODEL_KEY"
"#,
    )
    .unwrap();
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_shipyard_help() {
        shipyard()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("qa"));
    }

    #[test]
    fn test_shipyard_version() {
        shipyard()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        shipyard().arg("deploy").assert().failure();
    }
}

mod config_commands {
    use super::*;

    #[test]
    fn test_config_show_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        shipyard()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("using defaults"))
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("port = 3141"));
    }

    #[test]
    fn test_config_show_applies_env_override() {
        let dir = TempDir::new().unwrap();
        shipyard()
            .current_dir(dir.path())
            .env("SHIPYARD_PORT", "8088")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 8088"));
    }

    #[test]
    fn test_config_init_writes_file_once() {
        let dir = TempDir::new().unwrap();
        shipyard()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created shipyard.toml"));

        let content = fs::read_to_string(dir.path().join("shipyard.toml")).unwrap();
        assert!(content.contains("[campaign]"));
        assert!(content.contains("default_max_iterations = 3"));

        shipyard()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_init_honors_config_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf/custom.toml");
        shipyard()
            .args(["config", "init", "--config"])
            .arg(&path)
            .assert()
            .success();
        assert!(path.exists());
    }

    #[test]
    fn test_config_validate_reports_problems() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("shipyard.toml"),
            "[campaign]\ndefault_max_iterations = 0\n",
        )
        .unwrap();
        shipyard()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("default_max_iterations"));
    }

    #[test]
    fn test_malformed_config_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("shipyard.toml"), "[builder]\nkind = \"selenium\"\n").unwrap();
        shipyard()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse shipyard.toml"));
    }
}

mod campaign_commands {
    use super::*;

    #[test]
    fn test_run_requires_readable_criteria() {
        let dir = TempDir::new().unwrap();
        write_stub_config(&dir);
        shipyard()
            .current_dir(dir.path())
            .args(["run", "--criteria", "missing.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing.json"));
    }

    #[test]
    fn test_run_rejects_incomplete_criteria() {
        let dir = TempDir::new().unwrap();
        write_stub_config(&dir);
        fs::write(dir.path().join("criteria.json"), r#"{"target_user": "traders"}"#).unwrap();
        shipyard()
            .current_dir(dir.path())
            .args(["run", "--criteria", "criteria.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not describe valid criteria"));
    }

    #[test]
    fn test_run_without_model_key_fails_at_ideation() {
        let dir = TempDir::new().unwrap();
        write_stub_config(&dir);
        fs::write(
            dir.path().join("criteria.json"),
            r#"{"target_user": "traders", "primary_outcome": "see movers", "must_haves": ["gainers"]}"#,
        )
        .unwrap();
        shipyard()
            .current_dir(dir.path())
            .env_remove("SHIPYARD_CLI_TEST_MODEL_KEY")
            .args(["run", "--criteria", "criteria.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("SHIPYARD_CLI_TEST_MODEL_KEY"));
    }

    #[test]
    fn test_qa_rejects_invalid_spec() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("spec.json"),
            r##"{"name": "x", "acceptance_tests": [{"id": "T1", "method": "teleport", "target": "#a"}]}"##,
        )
        .unwrap();
        shipyard()
            .current_dir(dir.path())
            .args(["qa", "--spec", "spec.json", "--url", "http://127.0.0.1:9/"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a valid app spec"));
    }
}
