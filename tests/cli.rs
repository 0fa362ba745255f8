use assert_cmd::Command;
use predicates::prelude::*;

fn arbiter() -> Command {
    Command::cargo_bin("mpris-arbiter").unwrap()
}

#[test]
fn test_version() {
    arbiter()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mpris-arbiter"));
}

#[test]
fn test_help_lists_flags() {
    arbiter()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-fork"))
        .stdout(predicate::str::contains("--debug"))
        .stdout(predicate::str::contains("METHOD"));
}

#[test]
fn test_invalid_method_is_rejected() {
    arbiter()
        .arg("Stop")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid method"));
}
