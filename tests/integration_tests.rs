use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

mod e2e;
mod integration;

/// A `winapp` invocation isolated from the user's home and working directory.
pub fn winapp(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winapp"));
    cmd.env("WINAPP_HOME", home.path().join("global"))
        .env("WINAPP_NO_PROGRESS", "true")
        .env_remove("WINAPP_NUGET_SOURCE")
        .env_remove("RUST_LOG")
        .current_dir(home.path());
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winapp"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("restore"))
        .stdout(predicate::str::contains("get-winapp-path"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winapp"));
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("winapp"));
}

#[test]
fn test_no_command_prints_help() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_completions_bash() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winapp"));
    cmd.args(["completions", "bash"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("_winapp"))
        .stdout(predicate::str::contains("complete"));
}

#[test]
fn test_completions_zsh() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winapp"));
    cmd.args(["completions", "zsh"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("#compdef winapp"));
}

#[test]
fn test_markdown_help() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("winapp"));
    cmd.arg("--markdown-help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("winapp restore"));
}
