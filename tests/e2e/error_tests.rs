//! End-to-end tests for error handling and exit codes

use crate::winapp;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn invalid_subcommand_fails() {
    let home = TempDir::new().unwrap();
    winapp(&home).arg("invalid-command").assert().failure().stderr(
        predicate::str::contains("invalid-command").or(predicate::str::contains("unrecognized")),
    );
}

#[test]
fn restore_without_config_fails() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .arg("restore")
        .assert()
        .code(1)
        .stderr(predicate::str::starts_with("error:"))
        .stderr(predicate::str::contains("winapp init"));
}

#[test]
fn update_without_config_fails() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("winapp.yaml"));
}

#[test]
fn unknown_tool_is_rejected() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .args(["tool", "notatool"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown tool"));
}

#[test]
fn cert_generate_without_publisher_is_invalid_input() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .args(["cert", "generate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--publisher"));
}

#[test]
fn sign_missing_file_is_invalid_input() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("devcert.pfx"), b"pfx").unwrap();
    winapp(&home)
        .args(["sign", "missing.exe", "devcert.pfx"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing.exe"));
}

#[test]
fn package_missing_input_dir_fails() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .args(["package", "no-such-dir"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn cache_move_into_non_empty_dir_fails() {
    let home = TempDir::new().unwrap();
    let target = home.path().join("occupied");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("file.txt"), b"x").unwrap();
    winapp(&home)
        .args(["cache", "move"])
        .arg(&target)
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be empty"));
}

#[test]
fn invalid_manifest_version_is_rejected() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .args([
            "manifest",
            "generate",
            "--use-defaults",
            "--package-name",
            "Contoso.App",
            "--version",
            "1.2.3.4.5",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("four parts"));
    assert!(!home.path().join("appxmanifest.xml").exists());
}
