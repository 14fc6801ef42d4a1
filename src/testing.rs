//! Test doubles shared by unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::future::{ready, Future};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::process::{CommandRunner, ToolInvocation, ToolOutput};
use crate::services::PackageFeed;
use crate::tools::{ToolLocator, ToolService};

/// Records invocations and replays canned outputs in order, then succeeds
/// with empty output.
#[derive(Default)]
pub struct MockRunner {
    responses: Mutex<VecDeque<ToolOutput>>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl MockRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_responses(outputs: impl IntoIterator<Item = ToolOutput>) -> Arc<Self> {
        let runner = Self::default();
        runner.responses.lock().unwrap().extend(outputs);
        Arc::new(runner)
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn args_of(&self, index: usize) -> Vec<String> {
        self.calls()[index]
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

impl CommandRunner for MockRunner {
    fn run(
        &self,
        ctx: &TaskContext,
        invocation: &ToolInvocation,
    ) -> impl Future<Output = Result<ToolOutput>> + Send {
        let result = ctx.check().map(|_| {
            self.calls.lock().unwrap().push(invocation.clone());
            self.responses.lock().unwrap().pop_front().unwrap_or_default()
        });
        ready(result)
    }
}

/// Pretends every tool lives in `C:/tools`.
pub struct StaticLocator;

impl ToolLocator for StaticLocator {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        Some(PathBuf::from(format!("C:/tools/{}.exe", tool)))
    }
}

/// Finds nothing.
pub struct EmptyLocator;

impl ToolLocator for EmptyLocator {
    fn locate(&self, _tool: &str) -> Option<PathBuf> {
        None
    }
}

pub fn mock_tools(runner: &Arc<MockRunner>) -> ToolService<Arc<MockRunner>> {
    ToolService::new(runner.clone(), Arc::new(StaticLocator))
}

/// A feed that knows a fixed set of latest versions and installs anything.
#[derive(Default)]
pub struct StaticFeed {
    latest: BTreeMap<String, String>,
    installs: Mutex<Vec<(String, String)>>,
}

impl StaticFeed {
    pub fn new<'a>(latest: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            latest: latest
                .into_iter()
                .map(|(p, v)| (p.to_string(), v.to_string()))
                .collect(),
            installs: Mutex::default(),
        }
    }

    pub fn installs(&self) -> Vec<(String, String)> {
        self.installs.lock().unwrap().clone()
    }
}

impl PackageFeed for StaticFeed {
    fn install(
        &self,
        ctx: &TaskContext,
        package: &str,
        version: &str,
        _output_dir: &Path,
    ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send {
        let result = ctx.check().map(|_| {
            self.installs
                .lock()
                .unwrap()
                .push((package.to_string(), version.to_string()));
            BTreeMap::from([(package.to_string(), version.to_string())])
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
                .ok_or_else(|| WinappError::package(package, "not on feed")),
        )
    }
}
