//! C++/WinRT projection generation.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::process::{CommandRunner, ToolOutput};
use crate::tools::{BuildTool, ToolService};

pub const RESPONSE_FILE_NAME: &str = "cppwinrt.rsp";

pub struct CppWinrtService<R> {
    tools: ToolService<R>,
}

impl<R: CommandRunner> CppWinrtService<R> {
    pub fn new(tools: ToolService<R>) -> Self {
        Self { tools }
    }

    /// Writes a response file into `output_dir` and runs `cppwinrt @<rsp>`.
    ///
    /// `exe` overrides the located `cppwinrt` executable.
    pub async fn run_with_rsp(
        &self,
        ctx: &TaskContext,
        exe: Option<&Path>,
        winmd_inputs: &[PathBuf],
        output_dir: &Path,
        verbose: bool,
    ) -> Result<ToolOutput> {
        ctx.check()?;
        tokio::fs::create_dir_all(output_dir).await?;
        let rsp = output_dir.join(RESPONSE_FILE_NAME);
        tokio::fs::write(&rsp, response_file(winmd_inputs, output_dir, verbose)).await?;
        debug!("Wrote {} with {} inputs", rsp.display(), winmd_inputs.len());

        let arg = format!("@{}", rsp.display());
        let output = match exe {
            Some(exe) => {
                let output = self
                    .tools
                    .run_program(ctx, exe.to_path_buf(), [arg], Some(output_dir))
                    .await?;
                if !output.success() {
                    return Err(WinappError::tool_failed(
                        BuildTool::CppWinrt.name(),
                        output.exit_code,
                        BuildTool::CppWinrt.extract_error(&output),
                    ));
                }
                output
            }
            None => {
                self.tools
                    .run(ctx, BuildTool::CppWinrt, [arg], Some(output_dir))
                    .await?
            }
        };
        info!("Generated C++/WinRT projection in {}", output_dir.display());
        Ok(output)
    }
}

/// Response file text: one `-input` per winmd, then the output and flags.
pub fn response_file(winmd_inputs: &[PathBuf], output_dir: &Path, verbose: bool) -> String {
    let mut lines: Vec<String> = winmd_inputs
        .iter()
        .map(|p| format!("-input \"{}\"", p.display()))
        .collect();
    lines.push(format!("-output \"{}\"", output_dir.display()));
    lines.push("-optimize".to_string());
    if verbose {
        lines.push("-verbose".to_string());
    }
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Every `.winmd` under the given package directories, sorted.
pub fn find_winmd_files(package_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending: Vec<PathBuf> = package_dirs.to_vec();
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("winmd"))
            {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}
