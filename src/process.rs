//! External process execution.
//!
//! Every external tool (nuget, makepri, dotnet, PowerShell, …) is run through
//! the [`CommandRunner`] capability so services can be exercised with a mock
//! runner in tests. [`ProcessRunner`] is the `tokio::process` implementation:
//! output is captured, the child is killed if the task is cancelled, and an
//! optional timeout bounds the run.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use shell_escape::escape;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, trace, Instrument};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Program file stem, used as the tool name in errors and logs.
    pub fn tool_name(&self) -> String {
        self.program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Shell-escaped command line, for logging only.
    pub fn display_command(&self) -> String {
        let mut parts = vec![escape(self.program.to_string_lossy()).into_owned()];
        parts.extend(
            self.args
                .iter()
                .map(|a| escape(a.to_string_lossy()).into_owned()),
        );
        parts.join(" ")
    }
}

/// Captured result of an external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// Runs external commands and captures `(exit_code, stdout, stderr)`.
///
/// A non-zero exit is not an error at this level; callers classify it.
/// Implementations must return [`WinappError::Cancelled`] when the context is
/// cancelled while the command runs.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        ctx: &TaskContext,
        invocation: &ToolInvocation,
    ) -> impl Future<Output = Result<ToolOutput>> + Send;
}

impl<T: CommandRunner> CommandRunner for std::sync::Arc<T> {
    fn run(
        &self,
        ctx: &TaskContext,
        invocation: &ToolInvocation,
    ) -> impl Future<Output = Result<ToolOutput>> + Send {
        (**self).run(ctx, invocation)
    }
}

/// `tokio::process` backed runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    async fn run_inner(&self, ctx: &TaskContext, invocation: &ToolInvocation) -> Result<ToolOutput> {
        ctx.check()?;
        let command_line = invocation.display_command();
        debug!("Running command: {}", command_line);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WinappError::ToolNotFound(invocation.program.display().to_string())
            } else {
                error!("Process error: {}", e);
                WinappError::Io(e)
            }
        })?;

        // Dropping the wait future drops the child, which kills it.
        let wait = child.wait_with_output();
        let output = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                debug!("Cancelled while running: {}", command_line);
                return Err(WinappError::Cancelled);
            }
            result = async {
                match invocation.timeout {
                    Some(limit) => timeout(limit, wait).await.map_err(|_| {
                        error!("Command timed out after {:?}: {}", limit, command_line);
                        WinappError::tool_failed(
                            invocation.tool_name(),
                            -1,
                            format!("timed out after {} seconds", limit.as_secs()),
                        )
                    })?.map_err(WinappError::Io),
                    None => wait.await.map_err(WinappError::Io),
                }
            } => result?,
        };

        let result = ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!("{} exited with {}", command_line, result.exit_code);
        Ok(result)
    }
}

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        ctx: &TaskContext,
        invocation: &ToolInvocation,
    ) -> impl Future<Output = Result<ToolOutput>> + Send {
        self.run_inner(ctx, invocation).instrument(ctx.span().clone())
    }
}
