//! Relocating the package cache

use std::fs;
use tempfile::TempDir;
use winapp::services::{CacheService, WinappDirectory};
use winapp::TaskContext;

fn seeded_dirs(temp: &TempDir) -> WinappDirectory {
    let dirs = WinappDirectory::new(temp.path().join("home"));
    let package = dirs.default_packages_dir().join("Microsoft.WindowsAppSDK.1.7.250401001");
    fs::create_dir_all(package.join("lib")).unwrap();
    fs::write(package.join("lib").join("Microsoft.WindowsAppRuntime.dll"), b"dll").unwrap();
    fs::write(package.join("Microsoft.WindowsAppSDK.nupkg"), b"nupkg").unwrap();
    dirs
}

#[tokio::test]
async fn move_then_move_back() {
    let temp = TempDir::new().unwrap();
    let dirs = seeded_dirs(&temp);
    let service = CacheService::new(dirs.clone());
    let ctx = TaskContext::new("cache");
    let original = service.cache_path();
    let elsewhere = temp.path().join("elsewhere").join("packages");

    service.move_cache(&ctx, &elsewhere).await.unwrap();
    assert_eq!(dirs.packages_dir(), elsewhere);
    assert!(!original.exists());
    assert!(elsewhere
        .join("Microsoft.WindowsAppSDK.1.7.250401001/lib/Microsoft.WindowsAppRuntime.dll")
        .is_file());

    service.move_cache(&ctx, &original).await.unwrap();
    assert_eq!(service.cache_path(), original);
    assert!(original.join("Microsoft.WindowsAppSDK.1.7.250401001").is_dir());
}

#[tokio::test]
async fn cancelled_move_leaves_cache_in_place() {
    let temp = TempDir::new().unwrap();
    let dirs = seeded_dirs(&temp);
    let service = CacheService::new(dirs.clone());
    let before = service.cache_path();
    let target = temp.path().join("target");

    let ctx = TaskContext::new("cache");
    ctx.token().cancel();
    let err = service.move_cache(&ctx, &target).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(dirs.packages_dir(), before);
    assert!(before.join("Microsoft.WindowsAppSDK.1.7.250401001/Microsoft.WindowsAppSDK.nupkg").is_file());
    assert!(!target.exists());
    assert!(!temp.path().join(".target.staging").exists());
}
