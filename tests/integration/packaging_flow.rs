//! Packaging and signing through the tool wrappers

use super::{FakeLocator, RecordingRunner};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use winapp::services::{CertificateService, PackageRequest, PackagingService};
use winapp::{TaskContext, ToolOutput, ToolService, WinappError};

const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Package xmlns="http://schemas.microsoft.com/appx/manifest/foundation/windows10">
  <Identity
    Name="Contoso.Notes"
    Publisher="CN=Contoso"
    Version="3.0.1.0"
    ProcessorArchitecture="x64" />
</Package>
"#;

fn app(temp: &TempDir) -> std::path::PathBuf {
    let dir = temp.path().join("build");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("appxmanifest.xml"), MANIFEST).unwrap();
    fs::write(dir.join("Contoso.Notes.exe"), b"MZ").unwrap();
    dir
}

#[tokio::test]
async fn package_runs_makepri_then_makeappx() {
    let temp = TempDir::new().unwrap();
    let dir = app(&temp);
    let runner = Arc::new(RecordingRunner::default());
    let tools = ToolService::new(runner.clone(), Arc::new(FakeLocator));
    let service = PackagingService::new(tools).unwrap();

    let outcome = service
        .package(&TaskContext::new("package"), &PackageRequest::new(&dir))
        .await
        .unwrap();

    assert_eq!(outcome.identity.name, "Contoso.Notes");
    assert_eq!(outcome.path, temp.path().join("Contoso.Notes_3.0.1.0.msix"));
    assert_eq!(runner.tools_run(), ["makepri", "makepri", "makeappx"]);
    assert!(!outcome.signed);
}

#[tokio::test]
async fn signtool_error_lines_are_reported() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("Contoso.Notes.msix");
    let pfx = temp.path().join("devcert.pfx");
    fs::write(&file, b"msix").unwrap();
    fs::write(&pfx, b"pfx").unwrap();
    let runner = RecordingRunner::new([ToolOutput::new(
        1,
        "Done Adding Additional Store\n",
        "SignTool Error: The specified PFX password is not correct.\n",
    )]);
    let service = CertificateService::new(ToolService::new(runner.clone(), Arc::new(FakeLocator))).unwrap();

    let err = service
        .sign_file(&TaskContext::new("sign"), &file, &pfx, Some("wrong"), None)
        .await
        .unwrap_err();

    match err {
        WinappError::ToolFailed {
            tool,
            exit_code,
            message,
        } => {
            assert_eq!(tool, "signtool");
            assert_eq!(exit_code, 1);
            assert_eq!(message, "SignTool Error: The specified PFX password is not correct.");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.tools_run(), ["signtool"]);
}

#[tokio::test]
async fn cancelled_context_never_starts_tools() {
    let temp = TempDir::new().unwrap();
    let dir = app(&temp);
    let runner = Arc::new(RecordingRunner::default());
    let service = PackagingService::new(ToolService::new(runner.clone(), Arc::new(FakeLocator))).unwrap();
    let ctx = TaskContext::new("package");
    ctx.token().cancel();

    let err = service
        .package(&ctx, &PackageRequest::new(&dir))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(runner.tools_run().is_empty());
}
