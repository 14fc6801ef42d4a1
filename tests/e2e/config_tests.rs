//! End-to-end tests for project files and directory commands

use crate::winapp;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn global_path_comes_from_winapp_home() {
    let home = TempDir::new().unwrap();
    let expected = home.path().join("global");
    winapp(&home)
        .args(["get-winapp-path", "--global"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.to_string_lossy().as_ref()));
}

#[test]
fn local_path_is_project_winapp_dir() {
    let home = TempDir::new().unwrap();
    let output = winapp(&home).arg("get-winapp-path").output().unwrap();
    assert!(output.status.success());
    let printed = String::from_utf8(output.stdout).unwrap();
    assert!(printed.trim_end().ends_with(".winapp"));
    assert!(!printed.contains("global"));
}

#[test]
fn cache_path_defaults_under_global_dir() {
    let home = TempDir::new().unwrap();
    let expected = home.path().join("global").join("packages");
    winapp(&home)
        .args(["cache", "get-path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.to_string_lossy().as_ref()));
}

#[test]
fn cache_move_updates_reported_path() {
    let home = TempDir::new().unwrap();
    let packages = home.path().join("global").join("packages").join("Contoso.Lib.1.0.0");
    fs::create_dir_all(&packages).unwrap();
    fs::write(packages.join("Contoso.Lib.nupkg"), b"nupkg").unwrap();
    let target = home.path().join("relocated");

    winapp(&home)
        .args(["cache", "move"])
        .arg(&target)
        .assert()
        .success();

    assert!(target.join("Contoso.Lib.1.0.0").join("Contoso.Lib.nupkg").is_file());
    winapp(&home)
        .args(["cache", "get-path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(target.to_string_lossy().as_ref()));
}

#[test]
fn restore_with_empty_config_succeeds() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("winapp.yaml"), "packages:\n").unwrap();
    winapp(&home)
        .arg("restore")
        .assert()
        .success()
        .stderr(predicate::str::contains("no packages"));
}

#[test]
fn manifest_generate_with_defaults() {
    let home = TempDir::new().unwrap();
    winapp(&home)
        .args([
            "manifest",
            "generate",
            "--use-defaults",
            "--package-name",
            "Contoso.App",
            "--publisher",
            "Contoso Ltd",
            "--version",
            "2.1",
        ])
        .assert()
        .success();

    let manifest = fs::read_to_string(home.path().join("appxmanifest.xml")).unwrap();
    assert!(manifest.contains(r#"Name="Contoso.App""#));
    assert!(manifest.contains(r#"Publisher="CN=Contoso Ltd""#));
    assert!(manifest.contains(r#"Version="2.1.0.0""#));
}

#[test]
fn manifest_generate_sparse_into_directory() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join("sparse");
    winapp(&home)
        .args(["manifest", "generate"])
        .arg(&dir)
        .args(["--use-defaults", "--template", "sparse", "--package-name", "Contoso.Sparse"])
        .assert()
        .success();
    assert!(dir.join("appxmanifest.xml").is_file());
}

#[test]
fn manifest_generate_refuses_overwrite_without_force() {
    let home = TempDir::new().unwrap();
    fs::write(home.path().join("appxmanifest.xml"), "<Package/>").unwrap();

    winapp(&home)
        .args(["manifest", "generate", "--use-defaults", "--package-name", "Contoso.App"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    winapp(&home)
        .args(["manifest", "generate", "--use-defaults", "--package-name", "Contoso.App", "--force"])
        .assert()
        .success();
    let manifest = fs::read_to_string(home.path().join("appxmanifest.xml")).unwrap();
    assert!(manifest.contains("Contoso.App"));
}
