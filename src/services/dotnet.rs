//! The `dotnet` CLI.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::process::{CommandRunner, ToolOutput};
use crate::tools::ToolService;

/// A package reference reported by `dotnet list package`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNetPackage {
    pub id: String,
    pub requested_version: Option<String>,
    pub resolved_version: Option<String>,
    pub framework: String,
}

#[derive(Debug, Deserialize)]
struct ListReport {
    #[serde(default)]
    projects: Vec<ListProject>,
}

#[derive(Debug, Deserialize)]
struct ListProject {
    #[serde(default)]
    frameworks: Vec<ListFramework>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFramework {
    framework: String,
    #[serde(default)]
    top_level_packages: Vec<ListPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPackage {
    id: String,
    requested_version: Option<String>,
    resolved_version: Option<String>,
}

pub struct DotNetService<R> {
    tools: ToolService<R>,
}

impl<R: CommandRunner> DotNetService<R> {
    pub fn new(tools: ToolService<R>) -> Self {
        Self { tools }
    }

    /// Runs `dotnet <args>` in `working_dir`. A non-zero exit is returned, not raised.
    pub async fn run_dotnet_command<I, S>(&self, ctx: &TaskContext, working_dir: &Path, args: I) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let program = self.tools.locate_program("dotnet")?;
        let output = self
            .tools
            .run_program(ctx, program, args, Some(working_dir))
            .await?;
        debug!("dotnet exited with {}", output.exit_code);
        Ok(output)
    }

    pub async fn list_packages(&self, ctx: &TaskContext, project_dir: &Path) -> Result<Vec<DotNetPackage>> {
        let output = self
            .run_dotnet_command(ctx, project_dir, ["list", "package", "--format", "json"])
            .await?;
        if !output.success() {
            return Err(WinappError::tool_failed("dotnet", output.exit_code, output.combined()));
        }
        parse_package_list(&output.stdout)
    }

    pub async fn add_package(&self, ctx: &TaskContext, project_dir: &Path, name: &str, version: &str) -> Result<()> {
        let output = self
            .run_dotnet_command(ctx, project_dir, ["add", "package", name, "--version", version])
            .await?;
        if !output.success() {
            return Err(WinappError::package(name, output.combined()));
        }
        info!("Added {} {} to {}", name, version, project_dir.display());
        Ok(())
    }
}

/// Flattens `dotnet list package --format json` output; later frameworks do
/// not duplicate an id already seen.
pub fn parse_package_list(json: &str) -> Result<Vec<DotNetPackage>> {
    let report: ListReport = serde_json::from_str(json)?;
    let mut seen = BTreeSet::new();
    let mut packages = Vec::new();
    for framework in report.projects.into_iter().flat_map(|p| p.frameworks) {
        for package in framework.top_level_packages {
            if seen.insert(package.id.to_ascii_lowercase()) {
                packages.push(DotNetPackage {
                    id: package.id,
                    requested_version: package.requested_version,
                    resolved_version: package.resolved_version,
                    framework: framework.framework.clone(),
                });
            }
        }
    }
    Ok(packages)
}
