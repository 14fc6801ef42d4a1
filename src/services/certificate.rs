//! Development code-signing certificates and file signing.
//!
//! Certificates are created and imported by PowerShell scripts rendered from
//! the embedded templates; signing goes through `signtool`.

use std::path::{Path, PathBuf};

use chrono::{Duration as ChronoDuration, Utc};
use minijinja::context;
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::process::{CommandRunner, ToolOutput};
use crate::services::manifest::{normalize_publisher, read_identity};
use crate::templates::{TemplateRenderer, DEV_CERTIFICATE_SCRIPT, INSTALL_CERTIFICATE_SCRIPT};
use crate::tools::{BuildTool, ToolService};

pub const DEV_CERTIFICATE_FILE: &str = "devcert.pfx";
pub const DEFAULT_PASSWORD: &str = "password";
pub const DEFAULT_VALID_DAYS: u32 = 365;
const MAX_VALID_DAYS: u32 = 36_500;
pub const DEFAULT_TIMESTAMP_URL: &str = "http://timestamp.digicert.com";

/// What to do when the output certificate already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum IfExists {
    #[default]
    Skip,
    Overwrite,
}

#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub publisher: String,
    pub output: PathBuf,
    pub password: String,
    pub valid_days: u32,
    pub if_exists: IfExists,
}

impl CertificateRequest {
    pub fn new(publisher: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            publisher: publisher.into(),
            output: output.into(),
            password: DEFAULT_PASSWORD.to_string(),
            valid_days: DEFAULT_VALID_DAYS,
            if_exists: IfExists::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateOutcome {
    pub path: PathBuf,
    pub publisher: String,
    pub thumbprint: Option<String>,
    /// False when an existing certificate was kept.
    pub created: bool,
}

pub struct CertificateService<R> {
    tools: ToolService<R>,
    templates: TemplateRenderer,
}

impl<R: CommandRunner> CertificateService<R> {
    pub fn new(tools: ToolService<R>) -> Result<Self> {
        Ok(Self {
            tools,
            templates: TemplateRenderer::new()?,
        })
    }

    pub async fn generate_dev_certificate(
        &self,
        ctx: &TaskContext,
        request: &CertificateRequest,
    ) -> Result<CertificateOutcome> {
        let publisher = normalize_publisher(&request.publisher)?;
        if request.output.exists() && request.if_exists == IfExists::Skip {
            info!("Certificate {} already exists, skipping", request.output.display());
            return Ok(CertificateOutcome {
                path: request.output.clone(),
                publisher,
                thumbprint: None,
                created: false,
            });
        }
        if !(1..=MAX_VALID_DAYS).contains(&request.valid_days) {
            return Err(WinappError::invalid_input(
                "valid-days",
                format!("must be between 1 and {}", MAX_VALID_DAYS),
            ));
        }
        if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let not_after = Utc::now() + ChronoDuration::days(i64::from(request.valid_days));
        let script = self.templates.render(
            DEV_CERTIFICATE_SCRIPT,
            context! {
                publisher => &publisher,
                friendly_name => format!("{} development certificate", publisher.trim_start_matches("CN=")),
                not_after => not_after.to_rfc3339(),
                password => &request.password,
                output => request.output.to_string_lossy(),
            },
        )?;

        debug!("Generating certificate for {} valid until {}", publisher, not_after);
        let output = self.run_powershell(ctx, &script).await?;
        let thumbprint = output
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .map(str::to_string);
        info!("Created {}", request.output.display());
        Ok(CertificateOutcome {
            path: request.output.clone(),
            publisher,
            thumbprint,
            created: true,
        })
    }

    /// Imports a PFX into the local machine TrustedPeople store.
    pub async fn install_certificate(&self, ctx: &TaskContext, pfx: &Path, password: &str) -> Result<()> {
        if !pfx.is_file() {
            return Err(WinappError::Certificate(format!("{} not found", pfx.display())));
        }
        let script = self.templates.render(
            INSTALL_CERTIFICATE_SCRIPT,
            context! { pfx => pfx.to_string_lossy(), password => password },
        )?;
        self.run_powershell(ctx, &script).await?;
        info!("Installed {} into TrustedPeople", pfx.display());
        Ok(())
    }

    /// Signs `file` with the certificate in `pfx`.
    pub async fn sign_file(
        &self,
        ctx: &TaskContext,
        file: &Path,
        pfx: &Path,
        password: Option<&str>,
        timestamp_url: Option<&str>,
    ) -> Result<()> {
        if !file.is_file() {
            return Err(WinappError::invalid_input("file", format!("{} not found", file.display())));
        }
        if !pfx.is_file() {
            return Err(WinappError::Certificate(format!("{} not found", pfx.display())));
        }
        let mut args: Vec<String> = vec![
            "sign".into(),
            "/fd".into(),
            "SHA256".into(),
            "/a".into(),
            "/f".into(),
            pfx.to_string_lossy().into_owned(),
        ];
        if let Some(password) = password {
            args.extend(["/p".into(), password.to_string()]);
        }
        if let Some(url) = timestamp_url {
            args.extend(["/tr".into(), url.to_string(), "/td".into(), "SHA256".into()]);
        }
        args.push(file.to_string_lossy().into_owned());

        self.tools.run(ctx, BuildTool::SignTool, args, None).await?;
        info!("Signed {}", file.display());
        Ok(())
    }

    async fn run_powershell(&self, ctx: &TaskContext, script: &str) -> Result<ToolOutput> {
        let program = self
            .tools
            .locate_program("powershell")
            .or_else(|_| self.tools.locate_program("pwsh"))?;
        let output = self
            .tools
            .run_program(
                ctx,
                program,
                ["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command", script],
                None,
            )
            .await?;
        if output.success() {
            Ok(output)
        } else {
            Err(WinappError::Certificate(format!(
                "PowerShell exited with {}: {}",
                output.exit_code,
                output.combined()
            )))
        }
    }
}

/// Publisher recorded in a manifest's `<Identity>`.
pub fn publisher_from_manifest(manifest: &Path) -> Result<String> {
    Ok(read_identity(manifest)?.publisher)
}
