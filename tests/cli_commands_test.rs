// Binary-level checks for the operator CLI.

use assert_cmd::Command;
use predicates::prelude::*;

fn field_dispatch() -> Command {
    let mut cmd = Command::cargo_bin("field-dispatch").unwrap();
    // Keep a developer's local overrides out of the assertions.
    cmd.env_remove("RUST_LOG")
        .env("FIELD_DISPATCH__OBSERVABILITY__LOG_LEVEL", "error");
    cmd
}

#[test]
fn no_arguments_shows_getting_started() {
    field_dispatch()
        .assert()
        .success()
        .stdout(predicate::str::contains("field-dispatch thresholds"))
        .stdout(predicate::str::contains("5 statuses configured"));
}

#[test]
fn thresholds_lists_every_open_status() {
    field_dispatch()
        .arg("thresholds")
        .assert()
        .success()
        .stdout(predicate::str::contains("PENDING_ASSIGNMENT"))
        .stdout(predicate::str::contains("PENDING_CONFIRMATION"))
        .stdout(predicate::str::contains("COMPLETED").not());
}

#[test]
fn thresholds_json_is_machine_readable() {
    let output = field_dispatch()
        .args(["--json", "thresholds"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let assigning = rows
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["status"] == "ASSIGNING")
        .unwrap();
    assert_eq!(assigning["critical"], 24.0);
}

#[test]
fn simulate_reports_the_unmatched_order() {
    let fixture = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/fixture.json");
    field_dispatch()
        .args(["simulate", "--fixture", fixture])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 assigned, 1 unassigned"))
        .stdout(predicate::str::contains("NO_ELIGIBLE_WORKER"));
}

#[test]
fn classify_rejects_a_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    field_dispatch()
        .args(["classify", "--orders"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}
