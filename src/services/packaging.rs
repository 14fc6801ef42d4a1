//! MSIX packaging: resources, `makeappx pack`, optional signing.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::process::CommandRunner;
use crate::services::certificate::CertificateService;
use crate::services::makepri::{MakePriService, PRI_CONFIG_FILE, PRI_FILE};
use crate::services::manifest::{read_identity, ManifestIdentity, MANIFEST_FILE_NAME};
use crate::tools::{BuildTool, ToolService};

#[derive(Debug, Clone, Default)]
pub struct PackageRequest {
    pub input_dir: PathBuf,
    /// File or directory; defaults to `<Name>_<Version>.msix` beside the input.
    pub output: Option<PathBuf>,
    /// Defaults to `<input_dir>/appxmanifest.xml`.
    pub manifest: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub cert_password: Option<String>,
    pub skip_pri: bool,
}

impl PackageRequest {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub path: PathBuf,
    pub identity: ManifestIdentity,
    pub signed: bool,
}

pub struct PackagingService<R> {
    tools: ToolService<R>,
    makepri: MakePriService<R>,
    certificates: CertificateService<R>,
}

impl<R: CommandRunner + Clone> PackagingService<R> {
    pub fn new(tools: ToolService<R>) -> Result<Self> {
        Ok(Self {
            makepri: MakePriService::new(tools.clone()),
            certificates: CertificateService::new(tools.clone())?,
            tools,
        })
    }

    pub async fn package(&self, ctx: &TaskContext, request: &PackageRequest) -> Result<PackageOutcome> {
        let input = &request.input_dir;
        if !input.is_dir() {
            return Err(WinappError::invalid_input(
                "input-dir",
                format!("{} is not a directory", input.display()),
            ));
        }

        let in_dir_manifest = input.join(MANIFEST_FILE_NAME);
        let manifest = request.manifest.clone().unwrap_or_else(|| in_dir_manifest.clone());
        if !manifest.is_file() {
            return Err(WinappError::Manifest(format!(
                "{} not found (run 'winapp manifest generate')",
                manifest.display()
            )));
        }
        let identity = read_identity(&manifest)?;
        if manifest != in_dir_manifest {
            debug!("Copying {} into {}", manifest.display(), input.display());
            tokio::fs::copy(&manifest, &in_dir_manifest).await?;
        }

        if !request.skip_pri {
            self.generate_pri(ctx, input, &in_dir_manifest).await?;
        }

        let output = output_path(request, &identity);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let args = vec![
            "pack".to_string(),
            "/o".to_string(),
            "/d".to_string(),
            input.to_string_lossy().into_owned(),
            "/p".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        self.tools.run(ctx, BuildTool::MakeAppx, args, None).await?;
        info!("Created {}", output.display());

        let signed = match &request.cert {
            Some(cert) => {
                self.certificates
                    .sign_file(ctx, &output, cert, request.cert_password.as_deref(), None)
                    .await?;
                true
            }
            None => false,
        };

        Ok(PackageOutcome {
            path: output,
            identity,
            signed,
        })
    }

    async fn generate_pri(&self, ctx: &TaskContext, input: &Path, manifest: &Path) -> Result<()> {
        let config = input.join(PRI_CONFIG_FILE);
        self.makepri.create_config(ctx, &config, None).await?;
        let result = self
            .makepri
            .new_pri(ctx, input, &config, manifest, &input.join(PRI_FILE))
            .await;
        // The config must not end up inside the package.
        if let Err(e) = tokio::fs::remove_file(&config).await {
            debug!("Could not remove {}: {}", config.display(), e);
        }
        result.map(|_| ())
    }
}

/// `<Name>_<Version>.msix`.
pub fn default_package_file_name(identity: &ManifestIdentity) -> String {
    format!("{}_{}.msix", identity.name, identity.version)
}

fn output_path(request: &PackageRequest, identity: &ManifestIdentity) -> PathBuf {
    let file_name = default_package_file_name(identity);
    match &request.output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.clone(),
        None => request
            .input_dir
            .parent()
            .map(|p| p.join(&file_name))
            .unwrap_or_else(|| PathBuf::from(&file_name)),
    }
}
