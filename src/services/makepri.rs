//! `makepri` wrappers for building `resources.pri`.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::context::TaskContext;
use crate::errors::Result;
use crate::process::CommandRunner;
use crate::tools::{BuildTool, ToolService};

pub const PRI_CONFIG_FILE: &str = "priconfig.xml";
pub const PRI_FILE: &str = "resources.pri";
const DEFAULT_LANGUAGE: &str = "en-US";
const PLATFORM_VERSION: &str = "10.0.0";

pub struct MakePriService<R> {
    tools: ToolService<R>,
}

impl<R: CommandRunner> MakePriService<R> {
    pub fn new(tools: ToolService<R>) -> Self {
        Self { tools }
    }

    /// `makepri createconfig`, returning the config path.
    pub async fn create_config(&self, ctx: &TaskContext, output: &Path, language: Option<&str>) -> Result<PathBuf> {
        let args = vec![
            "createconfig".to_string(),
            "/cf".to_string(),
            output.to_string_lossy().into_owned(),
            "/dq".to_string(),
            language.unwrap_or(DEFAULT_LANGUAGE).to_string(),
            "/pv".to_string(),
            PLATFORM_VERSION.to_string(),
            "/o".to_string(),
        ];
        self.tools.run(ctx, BuildTool::MakePri, args, None).await?;
        info!("Created {}", output.display());
        Ok(output.to_path_buf())
    }

    /// `makepri new` over `project_root`, returning the PRI path.
    pub async fn new_pri(
        &self,
        ctx: &TaskContext,
        project_root: &Path,
        config: &Path,
        manifest: &Path,
        output: &Path,
    ) -> Result<PathBuf> {
        let args = vec![
            "new".to_string(),
            "/pr".to_string(),
            project_root.to_string_lossy().into_owned(),
            "/cf".to_string(),
            config.to_string_lossy().into_owned(),
            "/mn".to_string(),
            manifest.to_string_lossy().into_owned(),
            "/of".to_string(),
            output.to_string_lossy().into_owned(),
            "/o".to_string(),
        ];
        self.tools
            .run(ctx, BuildTool::MakePri, args, Some(project_root))
            .await?;
        info!("Created {}", output.display());
        Ok(output.to_path_buf())
    }
}
