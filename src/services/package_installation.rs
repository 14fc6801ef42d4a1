//! Batch package installation driven by `winapp.yaml`.
//!
//! Packages are resolved (pinned version, or latest from the feed) and then
//! installed one at a time. A failing package is recorded and the batch
//! continues; cancellation stops the batch and marks what is left as skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use derive_builder::Builder;
use tracing::{debug, info, warn};

use crate::configuration::{ConfigService, CONFIG_FILE_NAME};
use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::services::nuget::PackageFeed;
use crate::services::status::StatusService;
use crate::services::winapp_directory::WinappDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    NotInitialized,
    WorkspaceInitialized,
    PackagesResolving,
    PackagesInstalling,
    Done,
    Failed,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallPhase::NotInitialized => "not initialized",
            InstallPhase::WorkspaceInitialized => "workspace initialized",
            InstallPhase::PackagesResolving => "resolving packages",
            InstallPhase::PackagesInstalling => "installing packages",
            InstallPhase::Done => "done",
            InstallPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct InstallOptions {
    /// Resolve every package from the feed even when `winapp.yaml` pins it.
    pub ignore_config: bool,
    pub include_prerelease: bool,
    /// Write the installed versions back to `winapp.yaml`.
    pub update_config: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFailure {
    pub package: String,
    pub version: Option<String>,
    pub category: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub phase: InstallPhase,
    /// Every package id installed, dependencies included.
    pub installed: BTreeMap<String, String>,
    /// The version chosen for each requested package.
    pub resolved: BTreeMap<String, String>,
    pub failures: Vec<PackageFailure>,
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl InstallReport {
    /// A report for a batch that has not started.
    pub fn empty() -> Self {
        Self {
            phase: InstallPhase::NotInitialized,
            installed: BTreeMap::new(),
            resolved: BTreeMap::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.phase == InstallPhase::Done
    }

    fn fail(&mut self, package: &str, version: Option<&str>, error: &WinappError) {
        warn!("{} failed: {}", package, error);
        self.failures.push(PackageFailure {
            package: package.to_string(),
            version: version.map(str::to_string),
            category: error.category(),
            message: error.to_string(),
        });
    }

    fn cancel_remaining<'a>(&mut self, remaining: impl Iterator<Item = &'a str>) {
        self.cancelled = true;
        self.skipped.extend(remaining.map(str::to_string));
    }
}

pub struct PackageInstallationService<F> {
    feed: F,
    dirs: WinappDirectory,
    status: StatusService,
}

impl<F: PackageFeed> PackageInstallationService<F> {
    pub fn new(feed: F, dirs: WinappDirectory, status: StatusService) -> Self {
        Self { feed, dirs, status }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub async fn install_packages(
        &self,
        ctx: &TaskContext,
        root: &Path,
        packages: &[String],
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        let mut report = InstallReport::empty();

        let packages_dir = self.dirs.packages_dir();
        tokio::fs::create_dir_all(&packages_dir).await?;
        tokio::fs::create_dir_all(WinappDirectory::local_dir(root)).await?;
        report.phase = InstallPhase::WorkspaceInitialized;

        let config_service = ConfigService::at(root.join(CONFIG_FILE_NAME));
        let mut config = config_service.load()?;

        report.phase = InstallPhase::PackagesResolving;
        let mut plan: Vec<(String, String)> = Vec::with_capacity(packages.len());
        for (index, package) in packages.iter().enumerate() {
            if ctx.is_cancelled() {
                let resolved = plan.iter().map(|(p, _)| p.as_str());
                report.cancel_remaining(resolved.chain(packages[index..].iter().map(String::as_str)));
                break;
            }
            let pinned = if options.ignore_config {
                None
            } else {
                config.version_of(package).map(str::to_string)
            };
            let version = match pinned {
                Some(version) => Ok(version),
                None => {
                    self.feed
                        .latest_version(ctx, package, options.include_prerelease)
                        .await
                }
            };
            match version {
                Ok(version) => {
                    debug!("Resolved {} -> {}", package, version);
                    report.resolved.insert(package.clone(), version.clone());
                    plan.push((package.clone(), version));
                }
                Err(e) if e.is_cancelled() => {
                    let resolved = plan.iter().map(|(p, _)| p.as_str());
                    report.cancel_remaining(resolved.chain(packages[index..].iter().map(String::as_str)));
                    break;
                }
                Err(e) => report.fail(package, None, &e),
            }
        }

        if !report.cancelled {
            report.phase = InstallPhase::PackagesInstalling;
            for (index, (package, version)) in plan.iter().enumerate() {
                if ctx.is_cancelled() {
                    report.cancel_remaining(plan[index..].iter().map(|(p, _)| p.as_str()));
                    break;
                }
                let result = self
                    .status
                    .execute_with_status(
                        format!("Installing {} {}", package, version),
                        self.feed.install(ctx, package, version, &packages_dir),
                    )
                    .await;
                match result {
                    Ok(installed) => report.installed.extend(installed),
                    Err(e) if e.is_cancelled() => {
                        report.cancel_remaining(plan[index..].iter().map(|(p, _)| p.as_str()));
                        break;
                    }
                    Err(e) => report.fail(package, Some(version), &e),
                }
            }
        }

        if options.update_config && !report.cancelled {
            let mut changed = false;
            for (package, version) in &plan {
                if report.failures.iter().any(|f| &f.package == package) {
                    continue;
                }
                if config.version_of(package) != Some(version.as_str()) {
                    config.set_version(package, version);
                    changed = true;
                }
            }
            if changed || !config_service.exists() {
                config_service.save(&config)?;
                info!("Updated {}", config_service.path().display());
            }
        }

        report.phase = if report.failures.is_empty() && !report.cancelled {
            InstallPhase::Done
        } else {
            InstallPhase::Failed
        };
        info!(
            "Installed {} packages, {} failed, {} skipped",
            report.installed.len(),
            report.failures.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}
