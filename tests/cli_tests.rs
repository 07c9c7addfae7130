use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn replica_cmd() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("aos-replica").unwrap();
    cmd.env_remove("PROCESS_ID_TO_MONITOR")
        .env_remove("CHECKPOINT_TX_ID")
        .env_remove("FORWARD_TO_NONCE");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    replica_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("dry-run"))
        .stdout(predicate::str::contains("checkpoint"))
        .stdout(predicate::str::contains("health"));
}

#[test]
fn test_serve_help_shows_env_names() {
    replica_cmd()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PROCESS_ID_TO_MONITOR"))
        .stdout(predicate::str::contains("FORWARD_TO_NONCE"))
        .stdout(predicate::str::contains("LOAD_FROM_SCRATCH"));
}

#[test]
fn test_missing_process_id_exits_with_configuration_error() {
    let cache = TempDir::new().unwrap();
    replica_cmd()
        .args(["health", "--cache-dir"])
        .arg(cache.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("process id"));
}

#[test]
fn test_blank_process_id_from_env_is_rejected() {
    let cache = TempDir::new().unwrap();
    replica_cmd()
        .env("PROCESS_ID_TO_MONITOR", "   ")
        .args(["checkpoint", "--cache-dir"])
        .arg(cache.path())
        .assert()
        .code(2);
}

#[test]
fn test_invalid_forward_limit_is_rejected_by_parser() {
    replica_cmd()
        .args(["serve", "--process-id", "pid", "--forward-to-nonce", "soon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("forward-to-nonce"));
}

#[test]
fn test_dry_run_requires_message() {
    replica_cmd()
        .args(["dry-run", "--process-id", "pid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--message"));
}
