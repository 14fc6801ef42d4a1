//! Service integration tests
//!
//! These drive the library services through their public API with a
//! recording `CommandRunner` and an in-memory `PackageFeed`, so they run on
//! any platform without the Windows SDK or network access.

use std::collections::{BTreeMap, VecDeque};
use std::future::{ready, Future};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use winapp::process::ToolInvocation;
use winapp::services::PackageFeed;
use winapp::{CommandRunner, Result, TaskContext, ToolLocator, ToolOutput, WinappError};

pub mod cache_move;
pub mod install_flow;
pub mod packaging_flow;

/// Records every invocation and replays queued outputs, then succeeds.
#[derive(Default)]
pub struct RecordingRunner {
    outputs: Mutex<VecDeque<ToolOutput>>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl RecordingRunner {
    pub fn new(outputs: impl IntoIterator<Item = ToolOutput>) -> Arc<Self> {
        let runner = Self::default();
        runner.outputs.lock().unwrap().extend(outputs);
        Arc::new(runner)
    }

    pub fn tools_run(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.tool_name()).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(
        &self,
        ctx: &TaskContext,
        invocation: &ToolInvocation,
    ) -> impl Future<Output = Result<ToolOutput>> + Send {
        let result = ctx.check().map(|_| {
            self.calls.lock().unwrap().push(invocation.clone());
            self.outputs.lock().unwrap().pop_front().unwrap_or_default()
        });
        ready(result)
    }
}

/// Every tool is found under a fake install directory.
pub struct FakeLocator;

impl ToolLocator for FakeLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        Some(PathBuf::from("/opt/sdk/bin").join(format!("{}.exe", tool)))
    }
}

/// An in-memory feed. Packages in `broken` fail to install; reaching
/// `cancel_at` cancels the running context.
#[derive(Default)]
pub struct MemoryFeed {
    pub latest: BTreeMap<String, String>,
    pub dependencies: BTreeMap<String, (String, String)>,
    pub broken: Vec<String>,
    pub cancel_at: Option<String>,
    pub installed: Mutex<Vec<String>>,
}

impl MemoryFeed {
    pub fn with_latest(pairs: &[(&str, &str)]) -> Self {
        Self {
            latest: pairs
                .iter()
                .map(|(p, v)| (p.to_string(), v.to_string()))
                .collect(),
            ..Self::default()
        }
    }
}

impl PackageFeed for MemoryFeed {
    fn install(
        &self,
        ctx: &TaskContext,
        package: &str,
        version: &str,
        output_dir: &Path,
    ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send {
        if self.cancel_at.as_deref() == Some(package) {
            ctx.token().cancel();
        }
        let result = ctx.check().and_then(|_| {
            if self.broken.iter().any(|b| b == package) {
                return Err(WinappError::tool_failed("nuget", 1, format!("Unable to find package '{}'", package)));
            }
            std::fs::create_dir_all(output_dir.join(format!("{}.{}", package, version)))?;
            self.installed.lock().unwrap().push(package.to_string());
            let mut installed = BTreeMap::from([(package.to_string(), version.to_string())]);
            if let Some((dep, dep_version)) = self.dependencies.get(package) {
                installed.insert(dep.clone(), dep_version.clone());
            }
            Ok(installed)
        });
        ready(result)
    }

    fn latest_version(
        &self,
        _ctx: &TaskContext,
        package: &str,
        _prerelease: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        ready(
            self.latest
                .get(package)
                .cloned()
                .ok_or_else(|| WinappError::package(package, "not found on feed")),
        )
    }
}
