//! Batch installation through `PackageInstallationService`

use super::MemoryFeed;
use std::fs;
use tempfile::TempDir;
use winapp::configuration::CONFIG_FILE_NAME;
use winapp::services::{InstallOptions, InstallPhase, PackageInstallationService, StatusService, WinappDirectory};
use winapp::{ConfigService, PackagePin, TaskContext, WinappConfig};

struct Setup {
    _temp: TempDir,
    root: std::path::PathBuf,
    dirs: WinappDirectory,
}

fn setup() -> Setup {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("app");
    fs::create_dir_all(&root).unwrap();
    let dirs = WinappDirectory::new(temp.path().join("home"));
    Setup {
        _temp: temp,
        root,
        dirs,
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn failing_package_does_not_stop_the_batch() {
    let s = setup();
    let mut feed = MemoryFeed::with_latest(&[("A.Pkg", "1.0.0"), ("B.Pkg", "2.0.0"), ("C.Pkg", "3.0.0")]);
    feed.broken = names(&["B.Pkg"]);
    let service = PackageInstallationService::new(feed, s.dirs.clone(), StatusService::new(false));

    let report = service
        .install_packages(
            &TaskContext::new("restore"),
            &s.root,
            &names(&["A.Pkg", "B.Pkg", "C.Pkg"]),
            &InstallOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.phase, InstallPhase::Failed);
    assert!(!report.cancelled);
    assert_eq!(*service.feed().installed.lock().unwrap(), names(&["A.Pkg", "C.Pkg"]));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].package, "B.Pkg");
    assert_eq!(report.failures[0].category, "tool_failed");
    assert!(report.failures[0].message.contains("Unable to find package"));
}

#[tokio::test]
async fn cancellation_skips_the_rest_without_tool_failures() {
    let s = setup();
    let mut feed = MemoryFeed::with_latest(&[("A.Pkg", "1.0.0"), ("B.Pkg", "2.0.0"), ("C.Pkg", "3.0.0")]);
    feed.cancel_at = Some("B.Pkg".to_string());
    let service = PackageInstallationService::new(feed, s.dirs.clone(), StatusService::new(false));

    let report = service
        .install_packages(
            &TaskContext::new("restore"),
            &s.root,
            &names(&["A.Pkg", "B.Pkg", "C.Pkg"]),
            &InstallOptions::default(),
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.failures.is_empty());
    assert_eq!(report.skipped, names(&["B.Pkg", "C.Pkg"]));
    assert!(report.installed.contains_key("A.Pkg"));
    assert!(!report.is_success());
}

#[tokio::test]
async fn update_config_writes_resolved_versions() {
    let s = setup();
    let store = ConfigService::at(s.root.join(CONFIG_FILE_NAME));
    store
        .save(&WinappConfig::new(vec![PackagePin::new("A.Pkg", "0.9.0")]))
        .unwrap();
    let mut feed = MemoryFeed::with_latest(&[("A.Pkg", "1.0.0"), ("B.Pkg", "2.0.0")]);
    feed.dependencies
        .insert("B.Pkg".to_string(), ("B.Runtime".to_string(), "2.0.1".to_string()));
    let service = PackageInstallationService::new(feed, s.dirs.clone(), StatusService::new(false));
    let options = InstallOptions {
        ignore_config: true,
        update_config: true,
        ..InstallOptions::default()
    };

    let report = service
        .install_packages(&TaskContext::new("update"), &s.root, &names(&["A.Pkg", "B.Pkg"]), &options)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.installed.get("B.Runtime").map(String::as_str), Some("2.0.1"));
    let text = fs::read_to_string(store.path()).unwrap();
    assert_eq!(
        text,
        "packages:\n  - name: A.Pkg\n    version: 1.0.0\n  - name: B.Pkg\n    version: 2.0.0\n"
    );
    assert!(s.dirs.packages_dir().join("B.Pkg.2.0.0").is_dir());
}
