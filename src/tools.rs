//! Locating and running the Windows SDK build tools.
//!
//! Tools are found through the [`ToolLocator`] capability. The default chain
//! searches the versioned NuGet package directories recorded in `winapp.yaml`
//! first and falls back to `PATH`; results are cached for the life of the
//! process.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::configuration::WinappConfig;
use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::process::{CommandRunner, ToolInvocation, ToolOutput};
use crate::services::nuget::compare_versions;

pub const BUILD_TOOLS_PACKAGE: &str = "Microsoft.Windows.SDK.BuildTools";
pub const CPPWINRT_PACKAGE: &str = "Microsoft.Windows.CppWinRT";

const MAX_PROBE_DEPTH: usize = 6;

/// Finds an executable by tool name (`makepri`, `nuget`, …).
pub trait ToolLocator: Send + Sync {
    fn locate(&self, tool: &str) -> Option<PathBuf>;
}

/// Candidate file names for a tool, `.exe` first.
fn candidate_names(tool: &str) -> Vec<String> {
    if tool.to_ascii_lowercase().ends_with(".exe") {
        vec![tool.to_string()]
    } else {
        vec![format!("{}.exe", tool), tool.to_string()]
    }
}

/// Looks the tool up on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathLocator;

impl ToolLocator for PathLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

/// Probes `<packages>/<Package>.<Version>/bin/**` using the versions in use.
#[derive(Debug, Clone)]
pub struct PackageLocator {
    packages_dir: PathBuf,
    used_versions: BTreeMap<String, String>,
}

impl PackageLocator {
    pub fn new(packages_dir: impl Into<PathBuf>, used_versions: BTreeMap<String, String>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
            used_versions,
        }
    }

    pub fn from_config(packages_dir: impl Into<PathBuf>, config: &WinappConfig) -> Self {
        let used_versions = config
            .packages
            .iter()
            .map(|p| (p.name.clone(), p.version.clone()))
            .collect();
        Self::new(packages_dir, used_versions)
    }

    fn package_roots(&self) -> Vec<PathBuf> {
        self.used_versions
            .iter()
            .map(|(name, version)| self.packages_dir.join(format!("{}.{}", name, version)))
            .filter(|dir| dir.is_dir())
            .collect()
    }
}

impl ToolLocator for PackageLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        let names = candidate_names(tool);
        let mut matches = Vec::new();
        for root in self.package_roots() {
            collect_matches(&root.join("bin"), &names, 0, &mut matches);
        }
        trace!("{} candidates for {}: {:?}", matches.len(), tool, matches);
        best_match(matches)
    }
}

fn collect_matches(dir: &Path, names: &[String], depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_PROBE_DEPTH {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_matches(&path, names, depth + 1, out);
        } else if let Some(file_name) = path.file_name().and_then(|f| f.to_str()) {
            if names.iter().any(|n| n.eq_ignore_ascii_case(file_name)) {
                out.push(path);
            }
        }
    }
}

/// Directory name used by the SDK for the host architecture.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86" => "x86",
        _ => "x64",
    }
}

/// Prefers the host architecture, then the highest SDK version directory.
fn best_match(mut matches: Vec<PathBuf>) -> Option<PathBuf> {
    let arch = host_arch();
    let in_arch = |p: &PathBuf| {
        p.components()
            .any(|c| c.as_os_str().to_string_lossy().eq_ignore_ascii_case(arch))
    };
    matches.sort_by(|a, b| {
        in_arch(a)
            .cmp(&in_arch(b))
            .then_with(|| match (sdk_version(a), sdk_version(b)) {
                (Some(va), Some(vb)) => compare_versions(&va, &vb),
                (va, vb) => va.is_some().cmp(&vb.is_some()),
            })
            .then_with(|| a.cmp(b))
    });
    matches.pop()
}

/// Last path component shaped like `10.0.26100.0`.
fn sdk_version(path: &Path) -> Option<String> {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter(|c| c.contains('.') && c.chars().all(|ch| ch.is_ascii_digit() || ch == '.'))
        .last()
        .map(str::to_string)
}

/// Tries each locator in order.
#[derive(Clone, Default)]
pub struct ChainLocator {
    locators: Vec<Arc<dyn ToolLocator>>,
}

impl ChainLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locator: impl ToolLocator + 'static) -> Self {
        self.locators.push(Arc::new(locator));
        self
    }
}

impl ToolLocator for ChainLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        self.locators.iter().find_map(|l| l.locate(tool))
    }
}

/// Remembers successful lookups. Misses are not cached so a later install can
/// satisfy them.
pub struct CachingLocator<L> {
    inner: L,
    cache: Cache<String, PathBuf>,
}

impl<L: ToolLocator> CachingLocator<L> {
    pub fn new(inner: L) -> Self {
        let cache = Cache::builder()
            .max_capacity(64)
            .time_to_live(Duration::from_secs(300))
            .build();
        Self { inner, cache }
    }
}

impl<L: ToolLocator> ToolLocator for CachingLocator<L> {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        let key = tool.to_ascii_lowercase();
        if let Some(path) = self.cache.get(&key) {
            trace!("Tool cache hit for {}", tool);
            return Some(path);
        }
        let found = self.inner.locate(tool);
        if let Some(path) = &found {
            debug!("Located {} at {}", tool, path.display());
            self.cache.insert(key, path.clone());
        }
        found
    }
}

/// The default chain: package directories first, then `PATH`, cached.
pub fn default_locator(packages_dir: &Path, config: &WinappConfig) -> Arc<dyn ToolLocator> {
    Arc::new(CachingLocator::new(
        ChainLocator::new()
            .with(PackageLocator::from_config(packages_dir, config))
            .with(PathLocator),
    ))
}

/// Windows SDK and projection tools winapp knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildTool {
    MakeAppx,
    MakePri,
    SignTool,
    Mt,
    CppWinrt,
}

impl BuildTool {
    pub const ALL: [BuildTool; 5] = [
        BuildTool::MakeAppx,
        BuildTool::MakePri,
        BuildTool::SignTool,
        BuildTool::Mt,
        BuildTool::CppWinrt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuildTool::MakeAppx => "makeappx",
            BuildTool::MakePri => "makepri",
            BuildTool::SignTool => "signtool",
            BuildTool::Mt => "mt",
            BuildTool::CppWinrt => "cppwinrt",
        }
    }

    /// NuGet package that ships the tool.
    pub fn package(&self) -> &'static str {
        match self {
            BuildTool::CppWinrt => CPPWINRT_PACKAGE,
            _ => BUILD_TOOLS_PACKAGE,
        }
    }

    /// Extracts the most useful error text from a failed run.
    pub fn extract_error(&self, output: &ToolOutput) -> String {
        let filtered = |pred: &dyn Fn(&str) -> bool| -> String {
            output
                .stdout
                .lines()
                .chain(output.stderr.lines())
                .map(str::trim)
                .filter(|l| pred(l))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let extracted = match self {
            // makepri writes diagnostics to stdout too, but stderr is authoritative when present
            BuildTool::MakePri if !output.stderr.trim().is_empty() => output.stderr.trim().to_string(),
            BuildTool::SignTool => filtered(&|l| l.starts_with("SignTool Error:")),
            BuildTool::MakeAppx => filtered(&|l| l.to_ascii_lowercase().contains("error")),
            _ => String::new(),
        };

        if extracted.is_empty() {
            match output.stderr.trim() {
                "" => output.stdout.trim().to_string(),
                err => err.to_string(),
            }
        } else {
            extracted
        }
    }
}

impl fmt::Display for BuildTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuildTool {
    type Err = WinappError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().to_ascii_lowercase();
        let trimmed = trimmed.strip_suffix(".exe").unwrap_or(&trimmed);
        BuildTool::ALL
            .into_iter()
            .find(|t| t.name() == trimmed)
            .ok_or_else(|| {
                WinappError::invalid_input(
                    "tool",
                    format!(
                        "unknown tool '{}' (expected one of: {})",
                        s,
                        BuildTool::ALL.map(|t| t.name()).join(", ")
                    ),
                )
            })
    }
}

/// Locates build tools and runs them, classifying failures.
#[derive(Clone)]
pub struct ToolService<R> {
    runner: R,
    locator: Arc<dyn ToolLocator>,
    timeout: Option<Duration>,
}

impl<R: CommandRunner> ToolService<R> {
    pub fn new(runner: R, locator: Arc<dyn ToolLocator>) -> Self {
        Self {
            runner,
            locator,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn locate(&self, tool: BuildTool) -> Result<PathBuf> {
        self.locator.locate(tool.name()).ok_or_else(|| {
            WinappError::ToolNotFound(format!(
                "{} (install the {} package with 'winapp restore')",
                tool,
                tool.package()
            ))
        })
    }

    /// Locates an executable that is not one of the [`BuildTool`]s.
    pub fn locate_program(&self, name: &str) -> Result<PathBuf> {
        self.locator
            .locate(name)
            .ok_or_else(|| WinappError::ToolNotFound(name.to_string()))
    }

    /// Runs an already located program with this service's timeout,
    /// returning its output whatever the exit code.
    pub async fn run_program<I, S>(
        &self,
        ctx: &TaskContext,
        program: PathBuf,
        args: I,
        working_dir: Option<&Path>,
    ) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let invocation = self.invocation(program, args, working_dir);
        self.runner.run(ctx, &invocation).await
    }

    fn invocation<I, S>(&self, program: PathBuf, args: I, working_dir: Option<&Path>) -> ToolInvocation
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut invocation = ToolInvocation::new(program).args(args);
        if let Some(dir) = working_dir {
            invocation = invocation.working_dir(dir);
        }
        if let Some(limit) = self.timeout {
            invocation = invocation.timeout(limit);
        }
        invocation
    }

    /// Runs the tool and turns a non-zero exit into [`WinappError::ToolFailed`].
    pub async fn run<I, S>(
        &self,
        ctx: &TaskContext,
        tool: BuildTool,
        args: I,
        working_dir: Option<&Path>,
    ) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let output = self.run_unchecked(ctx, tool, args, working_dir).await?;
        if output.success() {
            Ok(output)
        } else {
            let message = tool.extract_error(&output);
            debug!("{} failed ({}): {}", tool, output.exit_code, message);
            Err(WinappError::tool_failed(tool.name(), output.exit_code, message))
        }
    }

    /// Runs the tool and returns its output whatever the exit code.
    pub async fn run_unchecked<I, S>(
        &self,
        ctx: &TaskContext,
        tool: BuildTool,
        args: I,
        working_dir: Option<&Path>,
    ) -> Result<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let program = self.locate(tool)?;
        let invocation = self.invocation(program, args, working_dir);
        self.runner.run(ctx, &invocation).await
    }
}
