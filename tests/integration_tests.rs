//! Integration tests for repo-migrator
//!
//! These run the binary against temporary project directories. Nothing here
//! talks to a real destination: runs stop before any collaborator is called.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a repo-migrator Command isolated from the caller's environment
fn migrator() -> Command {
    let mut cmd = cargo_bin_cmd!("repo-migrator");
    cmd.env_remove("MIGRATOR_ORG")
        .env_remove("MIGRATOR_GIT_CMD")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn write_config(dir: &Path, content: &str) {
    let migrator_dir = dir.join(".migrator");
    fs::create_dir_all(&migrator_dir).unwrap();
    fs::write(migrator_dir.join("migrator.toml"), content).unwrap();
}

const THREE_REPOS: &str = r#"
[source]
base_url = "https://git.example.com/scm/team"

[destination]
org = "acme"
token_env = "MIGRATOR_IT_TOKEN"

[[repositories]]
name = "svc-a"
description = "Service A"

[[repositories]]
name = "svc-b"

[[repositories]]
name = "svc-c"
"#;

const STATE: &str = r#"{
  "version": 1,
  "updated_at": "2026-03-01T10:00:00Z",
  "records": [
    {
      "name": "svc-a",
      "description": "Service A",
      "source_address": "https://git.example.com/scm/team/svc-a.git",
      "destination_group": "acme",
      "destination_address": "https://github.com/acme/svc-a.git",
      "source_fetched": true,
      "destination_created": true,
      "metadata_updated": true,
      "content_transferred": true,
      "final_verified": true,
      "steps": [
        { "name": "check-destination", "status": "completed", "duration_ms": 120 },
        { "name": "fetch-source", "status": "completed", "duration_ms": 2400 },
        { "name": "create-destination", "status": "completed", "duration_ms": 300 },
        { "name": "update-metadata", "status": "completed", "duration_ms": 200 },
        { "name": "transfer-content", "status": "completed", "duration_ms": 5100 },
        { "name": "verify-final", "status": "completed", "duration_ms": 800 }
      ],
      "retry_count": 0,
      "last_updated": "2026-03-01T09:59:00Z"
    },
    {
      "name": "svc-b",
      "source_address": "https://git.example.com/scm/team/svc-b.git",
      "destination_group": "acme",
      "source_fetched": true,
      "failure_reason": "transfer-content: protected branch hook declined",
      "error_category": "permission",
      "steps": [
        { "name": "fetch-source", "status": "completed" },
        { "name": "transfer-content", "status": "failed", "error": "protected branch hook declined", "error_category": "permission" }
      ],
      "retry_count": 1,
      "last_updated": "2026-03-01T10:00:00Z"
    },
    {
      "name": "retired",
      "source_address": "https://git.example.com/scm/team/retired.git",
      "retry_count": 0,
      "last_updated": "2026-02-01T10:00:00Z"
    }
  ]
}"#;

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        migrator()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("status"));
    }

    #[test]
    fn test_version() {
        migrator()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("repo-migrator"));
    }

    #[test]
    fn test_unknown_command_fails() {
        migrator().arg("teleport").assert().failure();
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config_commands {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let dir = create_temp_project();

        migrator()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created migrator.toml"));

        let path = dir.path().join(".migrator/migrator.toml");
        assert!(path.exists());
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("[destination]"));
        assert!(content.contains("example-service"));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);

        migrator()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join(".migrator/migrator.toml")).unwrap();
        assert!(content.contains("svc-a"));
    }

    #[test]
    fn test_config_validate_template_is_valid() {
        let dir = create_temp_project();

        migrator()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success();

        migrator()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        write_config(
            dir.path(),
            r#"
[migration]
backup_retention = 0

[[repositories]]
name = "svc a"
source = "https://git.example.com/a.git"

[[repositories]]
name = "svc-b"
"#,
        );

        migrator()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings:"))
            .stdout(predicate::str::contains("No destination organization"))
            .stdout(predicate::str::contains("Invalid repository name 'svc a'"))
            .stdout(predicate::str::contains("'svc-b' has no source"))
            .stdout(predicate::str::contains("backup_retention is 0"));
    }

    #[test]
    fn test_config_show_uses_env_override() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);

        migrator()
            .current_dir(dir.path())
            .env("MIGRATOR_ORG", "other-org")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("org = \"acme\""))
            .stdout(predicate::str::contains("org = \"other-org\""))
            .stdout(predicate::str::contains("Repositories: 3"));
    }

    #[test]
    fn test_explicit_config_path() {
        let dir = create_temp_project();
        let path = dir.path().join("custom.toml");
        fs::write(&path, THREE_REPOS).unwrap();

        migrator()
            .current_dir(dir.path())
            .arg("--config")
            .arg(&path)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("svc-c"));
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let dir = create_temp_project();

        migrator()
            .current_dir(dir.path())
            .args(["--config", "nowhere.toml", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }
}

// =============================================================================
// List and Status Tests
// =============================================================================

mod read_only_commands {
    use super::*;

    #[test]
    fn test_list_resolves_sources() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);

        migrator()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("Destination organization: acme"))
            .stdout(predicate::str::contains(
                "https://git.example.com/scm/team/svc-b.git",
            ))
            .stdout(predicate::str::contains("3 repositories"));
    }

    #[test]
    fn test_list_without_configuration() {
        let dir = create_temp_project();

        migrator()
            .current_dir(dir.path())
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No repositories configured."));
    }

    #[test]
    fn test_status_before_first_run() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);

        migrator()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No migration has run yet"));
    }

    #[test]
    fn test_status_reports_persisted_records() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);
        fs::write(dir.path().join(".migrator/state.json"), STATE).unwrap();

        migrator()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("final-verified"))
            .stdout(predicate::str::contains("Needs manual attention:"))
            .stdout(predicate::str::contains("protected branch hook declined"))
            .stdout(predicate::str::contains("not started"))
            .stdout(predicate::str::contains(
                "Ignoring records no longer configured: retired",
            ));
    }

    #[test]
    fn test_status_does_not_rewrite_state_file() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);
        let state_path = dir.path().join(".migrator/state.json");
        fs::write(&state_path, STATE).unwrap();

        migrator()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success();

        assert_eq!(fs::read_to_string(&state_path).unwrap(), STATE);
    }

    #[test]
    fn test_status_single_repository() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);
        fs::write(dir.path().join(".migrator/state.json"), STATE).unwrap();

        migrator()
            .current_dir(dir.path())
            .args(["status", "svc-b"])
            .assert()
            .success()
            .stdout(predicate::str::contains("transfer-content"))
            .stdout(predicate::str::contains("retries: 1"));

        migrator()
            .current_dir(dir.path())
            .args(["status", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown repository 'nope'"));
    }

    #[test]
    fn test_status_rejects_corrupt_state_file() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);
        fs::write(dir.path().join(".migrator/state.json"), "{ not json").unwrap();

        migrator()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to load migration records"));
    }
}

// =============================================================================
// Run Command Tests
// =============================================================================

mod run_command {
    use super::*;

    #[test]
    fn test_run_with_no_repositories() {
        let dir = create_temp_project();

        migrator()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .success()
            .stdout(predicate::str::contains("No repositories configured"));

        assert!(dir.path().join(".migrator/logs").is_dir());
        assert!(!dir.path().join(".migrator/state.json").exists());
    }

    #[test]
    fn test_run_rejects_unknown_only_names() {
        let dir = create_temp_project();
        write_config(dir.path(), THREE_REPOS);

        migrator()
            .current_dir(dir.path())
            .args(["run", "--only", "svc-a,svc-z"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown repositories: svc-z"));
    }

    #[test]
    fn test_run_requires_destination_org() {
        let dir = create_temp_project();
        write_config(
            dir.path(),
            r#"
[[repositories]]
name = "svc-a"
source = "https://git.example.com/svc-a.git"
"#,
        );

        migrator()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No destination organization configured"));
    }
}
