//! Command implementations for the winapp CLI.
//!
//! Each handler wires the domain services together for one subcommand. The
//! handlers take the [`CommandRunner`] and [`PackageFeed`] they should use so
//! that they can be driven with fakes in tests; `main.rs` passes the
//! production [`ProcessRunner`](crate::process::ProcessRunner) and a
//! [`NugetService`].
//!
//! # Commands
//!
//! - [`init_command`]: create `winapp.yaml`, install packages, manifest, certificate
//! - [`restore_command`]: install the packages pinned in `winapp.yaml`
//! - [`update_command`]: move every pin to the latest feed version
//! - [`package_command`], [`manifest_generate_command`], [`cert_generate_command`],
//!   [`cert_install_command`], [`sign_command`], [`tool_command`]
//! - [`cache_get_path_command`], [`cache_move_command`], [`cache_clear_command`]
//! - [`get_winapp_path_command`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::configuration::{ConfigService, Settings, CONFIG_FILE_NAME};
use crate::context::TaskContext;
use crate::directory::CurrentDirectory;
use crate::errors::{Result, WinappError};
use crate::output;
use crate::process::CommandRunner;
use crate::services::certificate::{publisher_from_manifest, CertificateOutcome, DEV_CERTIFICATE_FILE};
use crate::services::cppwinrt::find_winmd_files;
use crate::services::manifest::MANIFEST_FILE_NAME;
use crate::services::packaging::PackageOutcome;
use crate::services::{
    update_gitignore, CacheService, CertificateRequest, CertificateService, CppWinrtService,
    DotNetService, InstallOptions, InstallReport, ManifestOptions, ManifestService, NugetService,
    PackageFeed, PackageInstallationService, PackageRequest, PackagingService, Prompter,
    StatusService, WinappDirectory,
};
use crate::tools::{default_locator, BuildTool, ToolLocator, ToolService, BUILD_TOOLS_PACKAGE, CPPWINRT_PACKAGE};


pub const WINDOWS_APP_SDK_PACKAGE: &str = "Microsoft.WindowsAppSDK";

/// Packages a new project starts with.
pub const DEFAULT_PACKAGES: [&str; 3] = [BUILD_TOOLS_PACKAGE, CPPWINRT_PACKAGE, WINDOWS_APP_SDK_PACKAGE];

/// Where the C++/WinRT projection headers go, relative to the project `.winapp`.
const GENERATED_INCLUDE_DIR: &str = "generated/include";

/// The project a command operates on, plus process-wide settings.
pub struct Workspace {
    root: PathBuf,
    dirs: WinappDirectory,
    settings: Settings,
    status: StatusService,
    locator: Option<Arc<dyn ToolLocator>>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, dirs: WinappDirectory, settings: Settings, status: StatusService) -> Self {
        Self {
            root: root.into(),
            dirs,
            settings,
            status,
            locator: None,
        }
    }

    /// Resolves the project root from the current directory provider.
    pub fn from_directory(
        dir: &impl CurrentDirectory,
        settings: Settings,
        status: StatusService,
    ) -> Result<Self> {
        let dirs = WinappDirectory::from_settings(&settings)?;
        Ok(Self::new(dir.current_dir()?, dirs, settings, status))
    }

    /// Replaces the default package-then-PATH tool lookup.
    pub fn with_locator(mut self, locator: Arc<dyn ToolLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dirs(&self) -> &WinappDirectory {
        &self.dirs
    }

    pub fn config(&self) -> ConfigService {
        ConfigService::at(self.root.join(CONFIG_FILE_NAME))
    }

    /// Tool lookup reflects the pins in `winapp.yaml` at the time of the call.
    pub fn tool_service<R: CommandRunner>(&self, runner: R) -> Result<ToolService<R>> {
        let locator = match &self.locator {
            Some(locator) => Arc::clone(locator),
            None => default_locator(&self.dirs.packages_dir(), &self.config().load()?),
        };
        Ok(ToolService::new(runner, locator).with_timeout(self.settings.tool_timeout()))
    }

    pub fn nuget<R: CommandRunner>(&self, runner: R) -> Result<NugetService<R>> {
        Ok(NugetService::new(self.tool_service(runner)?, self.dirs.clone())
            .with_source(self.settings.nuget_source.clone()))
    }

    fn installer<F: PackageFeed>(&self, feed: F) -> PackageInstallationService<F> {
        PackageInstallationService::new(feed, self.dirs.clone(), self.status)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub use_defaults: bool,
    /// Only write `winapp.yaml`; nothing is installed or generated.
    pub config_only: bool,
    pub no_gitignore: bool,
    pub no_cert: bool,
    pub prerelease: bool,
}

/// Sets up a project: pins and installs the default packages, generates the
/// C++/WinRT projection, the manifest and a development certificate.
///
/// An existing `winapp.yaml` is respected; its pins are installed as they are.
pub async fn init_command<R, F>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    feed: F,
    options: &InitOptions,
    prompter: &dyn Prompter,
) -> Result<()>
where
    R: CommandRunner + Clone,
    F: PackageFeed,
{
    let store = ws.config();
    let mut config = store.load()?;
    let packages: Vec<String> = if config.packages.is_empty() {
        DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect()
    } else {
        config.packages.iter().map(|p| p.name.clone()).collect()
    };

    if options.config_only {
        for package in &packages {
            if config.version_of(package).is_none() {
                let version = feed.latest_version(ctx, package, options.prerelease).await?;
                config.set_version(package, &version);
            }
        }
        store.save(&config)?;
        output::success(&format!("Wrote {}", output::path(store.path())));
        return Ok(());
    }

    let install = InstallOptions {
        include_prerelease: options.prerelease,
        update_config: true,
        ..InstallOptions::default()
    };
    let report = ws
        .installer(feed)
        .install_packages(ctx, ws.root(), &packages, &install)
        .await?;
    finish_install(&report)?;

    generate_projection(ws, ctx, runner.clone(), &report).await?;
    add_dotnet_references(ws, ctx, runner.clone(), &report).await?;

    let manifest = ws.root().join(MANIFEST_FILE_NAME);
    if !manifest.exists() {
        let options = ManifestOptions {
            use_defaults: options.use_defaults,
            ..ManifestOptions::default()
        };
        manifest_generate_command(ctx, ws.root(), &options, prompter)?;
    }

    if !options.no_gitignore && update_gitignore(ws.root())? {
        output::success("Updated .gitignore");
    }

    if !options.no_cert {
        let request = CertificateRequest::new(
            publisher_from_manifest(&manifest)?,
            ws.root().join(DEV_CERTIFICATE_FILE),
        );
        cert_generate_command(ws, ctx, runner, &request).await?;
    }
    Ok(())
}

/// Installs every package pinned in `winapp.yaml`.
pub async fn restore_command<R, F>(ws: &Workspace, ctx: &TaskContext, runner: R, feed: F) -> Result<InstallReport>
where
    R: CommandRunner,
    F: PackageFeed,
{
    let packages = pinned_packages(ws)?;
    if packages.is_empty() {
        output::warning(&format!("{} has no packages", CONFIG_FILE_NAME));
        return Ok(InstallReport::empty());
    }
    let report = ws
        .installer(feed)
        .install_packages(ctx, ws.root(), &packages, &InstallOptions::default())
        .await?;
    finish_install(&report)?;
    generate_projection(ws, ctx, runner, &report).await?;
    Ok(report)
}

/// Resolves the latest version of every pinned package and rewrites the pins.
pub async fn update_command<R, F>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    feed: F,
    prerelease: bool,
) -> Result<InstallReport>
where
    R: CommandRunner,
    F: PackageFeed,
{
    let packages = pinned_packages(ws)?;
    let options = InstallOptions {
        ignore_config: true,
        include_prerelease: prerelease,
        update_config: true,
    };
    let report = ws
        .installer(feed)
        .install_packages(ctx, ws.root(), &packages, &options)
        .await?;
    finish_install(&report)?;
    generate_projection(ws, ctx, runner, &report).await?;
    Ok(report)
}

fn pinned_packages(ws: &Workspace) -> Result<Vec<String>> {
    let store = ws.config();
    if !store.exists() {
        return Err(WinappError::Config(format!(
            "{} not found (run 'winapp init' first)",
            store.path().display()
        )));
    }
    Ok(store.load()?.packages.into_iter().map(|p| p.name).collect())
}

/// Prints the results table and turns an unsuccessful report into an error.
fn finish_install(report: &InstallReport) -> Result<()> {
    if !report.resolved.is_empty() || !report.failures.is_empty() {
        println!("{}", output::report_table(report));
    }
    if report.cancelled {
        return Err(WinappError::Cancelled);
    }
    if !report.failures.is_empty() {
        return Err(WinappError::Package(format!(
            "{} of {} packages failed",
            report.failures.len(),
            report.resolved.len().max(report.failures.len())
        )));
    }
    output::success(&format!(
        "Installed {} packages ({} including dependencies)",
        output::count(report.resolved.len()),
        output::count(report.installed.len())
    ));
    Ok(())
}

/// Runs cppwinrt over the installed metadata when the CppWinRT package is part of the set.
async fn generate_projection<R: CommandRunner>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    report: &InstallReport,
) -> Result<()> {
    let has_cppwinrt = report
        .installed
        .keys()
        .any(|id| id.eq_ignore_ascii_case(CPPWINRT_PACKAGE));
    if !has_cppwinrt {
        return Ok(());
    }
    let packages_dir = ws.dirs().packages_dir();
    let package_dirs: Vec<PathBuf> = report
        .installed
        .iter()
        .map(|(id, version)| packages_dir.join(format!("{}.{}", id, version)))
        .collect();
    let winmd = find_winmd_files(&package_dirs);
    if winmd.is_empty() {
        debug!("No .winmd files in installed packages, skipping projection");
        return Ok(());
    }
    let out = WinappDirectory::local_dir(ws.root()).join(GENERATED_INCLUDE_DIR);
    CppWinrtService::new(ws.tool_service(runner)?)
        .run_with_rsp(ctx, None, &winmd, &out, false)
        .await?;
    output::success(&format!("Generated C++/WinRT headers in {}", output::path(&out)));
    Ok(())
}

/// Adds missing package references to a .NET project in the root, if there is one.
async fn add_dotnet_references<R: CommandRunner>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    report: &InstallReport,
) -> Result<()> {
    if find_csproj(ws.root()).is_none() {
        return Ok(());
    }
    let dotnet = DotNetService::new(ws.tool_service(runner)?);
    let existing = dotnet.list_packages(ctx, ws.root()).await?;
    for (package, version) in &report.resolved {
        // Headers are for C++ projects only.
        if package.eq_ignore_ascii_case(CPPWINRT_PACKAGE) {
            continue;
        }
        if existing.iter().any(|p| p.id.eq_ignore_ascii_case(package)) {
            debug!("{} already referenced", package);
            continue;
        }
        dotnet.add_package(ctx, ws.root(), package, version).await?;
        output::success(&format!("Added {} to the project", output::package_name(package)));
    }
    Ok(())
}

fn find_csproj(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .find(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csproj")))
}

pub async fn package_command<R>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    request: &PackageRequest,
) -> Result<PackageOutcome>
where
    R: CommandRunner + Clone,
{
    let service = PackagingService::new(ws.tool_service(runner)?)?;
    let outcome = service.package(ctx, request).await?;
    let signed = if outcome.signed { " (signed)" } else { "" };
    output::success(&format!("Created {}{}", output::path(&outcome.path), signed));
    Ok(outcome)
}

pub fn manifest_generate_command(
    ctx: &TaskContext,
    dir: &Path,
    options: &ManifestOptions,
    prompter: &dyn Prompter,
) -> Result<PathBuf> {
    let path = ManifestService::new()?.generate_manifest(ctx, dir, options, prompter)?;
    output::success(&format!("Generated {}", output::path(&path)));
    Ok(path)
}

/// Publisher for `cert generate`: explicit value, else the given manifest,
/// else `appxmanifest.xml` in the project root.
pub fn resolve_publisher(ws: &Workspace, publisher: Option<&str>, manifest: Option<&Path>) -> Result<String> {
    if let Some(publisher) = publisher {
        return Ok(publisher.to_string());
    }
    let manifest = manifest
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ws.root().join(MANIFEST_FILE_NAME));
    if !manifest.is_file() {
        return Err(WinappError::invalid_input(
            "publisher",
            format!("pass --publisher or create {} first", manifest.display()),
        ));
    }
    publisher_from_manifest(&manifest)
}

pub async fn cert_generate_command<R: CommandRunner>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    request: &CertificateRequest,
) -> Result<CertificateOutcome> {
    let service = CertificateService::new(ws.tool_service(runner)?)?;
    let outcome = ws
        .status
        .execute_with_status(
            "Generating development certificate",
            service.generate_dev_certificate(ctx, request),
        )
        .await?;
    if outcome.created {
        output::success(&format!(
            "Created certificate {} for {}",
            output::path(&outcome.path),
            outcome.publisher
        ));
        if let Some(thumbprint) = &outcome.thumbprint {
            output::info(&format!("Thumbprint: {}", thumbprint));
        }
    } else {
        output::info(&format!("Certificate {} already exists", output::path(&outcome.path)));
    }
    Ok(outcome)
}

pub async fn cert_install_command<R: CommandRunner>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    pfx: &Path,
    password: &str,
) -> Result<()> {
    CertificateService::new(ws.tool_service(runner)?)?
        .install_certificate(ctx, pfx, password)
        .await?;
    output::success(&format!("Installed {} into TrustedPeople", output::path(pfx)));
    Ok(())
}

pub async fn sign_command<R: CommandRunner>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    file: &Path,
    pfx: &Path,
    password: Option<&str>,
    timestamp_url: Option<&str>,
) -> Result<()> {
    CertificateService::new(ws.tool_service(runner)?)?
        .sign_file(ctx, file, pfx, password, timestamp_url)
        .await?;
    output::success(&format!("Signed {}", output::path(file)));
    Ok(())
}

/// Runs a build tool with the user's arguments, passing its output through.
/// Returns the tool's exit code.
pub async fn tool_command<R: CommandRunner>(
    ws: &Workspace,
    ctx: &TaskContext,
    runner: R,
    tool: BuildTool,
    args: &[String],
) -> Result<i32> {
    let tools = ws.tool_service(runner)?;
    let output = tools.run_unchecked(ctx, tool, args, Some(ws.root())).await?;
    print!("{}", output.stdout);
    eprint!("{}", output.stderr);
    if !output.success() {
        warn!("{} exited with {}", tool, output.exit_code);
    }
    Ok(output.exit_code)
}

pub fn cache_get_path_command(ws: &Workspace) -> PathBuf {
    let path = CacheService::new(ws.dirs().clone()).cache_path();
    println!("{}", path.display());
    path
}

pub async fn cache_move_command(ws: &Workspace, ctx: &TaskContext, new_path: &Path) -> Result<PathBuf> {
    let service = CacheService::new(ws.dirs().clone());
    let moved = ws
        .status
        .execute_with_status("Moving package cache", service.move_cache(ctx, new_path))
        .await?;
    output::success(&format!("Package cache moved to {}", output::path(&moved)));
    Ok(moved)
}

pub async fn cache_clear_command(ws: &Workspace, ctx: &TaskContext) -> Result<bool> {
    let cleared = CacheService::new(ws.dirs().clone()).clear_cache(ctx).await?;
    if cleared {
        output::success("Package cache cleared");
    } else {
        output::info("Package cache is already empty");
    }
    Ok(cleared)
}

/// The global directory, or the nearest project `.winapp` (the root's own
/// `.winapp` when none exists yet).
pub fn get_winapp_path_command(ws: &Workspace, global: bool) -> PathBuf {
    let path = if global {
        ws.dirs().global_dir().to_path_buf()
    } else {
        ws.dirs()
            .find_local_dir(ws.root())
            .unwrap_or_else(|| WinappDirectory::local_dir(ws.root()))
    };
    info!("winapp path: {}", path.display());
    println!("{}", path.display());
    path
}
