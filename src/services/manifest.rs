//! `appxmanifest.xml` generation and identity reading.

use std::fs;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use dialoguer::{theme::ColorfulTheme, Input};
use serde::Serialize;
use tracing::{debug, info};
use validator::Validate;

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::templates::{TemplateRenderer, PACKAGED_MANIFEST, SPARSE_MANIFEST};
use crate::tools::host_arch;

pub const MANIFEST_FILE_NAME: &str = "appxmanifest.xml";
const DEFAULT_VERSION: &str = "1.0.0.0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ManifestTemplate {
    /// Full MSIX package
    #[default]
    Packaged,
    /// Sparse package giving identity to an unpackaged executable
    Sparse,
}

impl ManifestTemplate {
    fn template_name(&self) -> &'static str {
        match self {
            ManifestTemplate::Packaged => PACKAGED_MANIFEST,
            ManifestTemplate::Sparse => SPARSE_MANIFEST,
        }
    }
}

/// User-supplied manifest metadata. Missing fields are prompted for, or
/// defaulted when `use_defaults` is set.
#[derive(Debug, Clone, Default, Builder)]
#[builder(default, setter(into))]
pub struct ManifestOptions {
    #[builder(setter(into, strip_option))]
    pub package_name: Option<String>,
    #[builder(setter(into, strip_option))]
    pub publisher: Option<String>,
    #[builder(setter(into, strip_option))]
    pub version: Option<String>,
    #[builder(setter(into, strip_option))]
    pub description: Option<String>,
    #[builder(setter(into, strip_option))]
    pub executable: Option<String>,
    pub template: ManifestTemplate,
    pub use_defaults: bool,
    pub force: bool,
}

/// Fully resolved values rendered into the template.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ManifestData {
    #[validate(length(min = 3, max = 50, message = "must be 3 to 50 characters"))]
    pub package_name: String,
    #[validate(length(min = 4, max = 8192))]
    pub publisher: String,
    pub publisher_display_name: String,
    pub version: String,
    pub display_name: String,
    #[validate(length(max = 2048))]
    pub description: String,
    #[validate(length(min = 1, message = "executable is required"))]
    pub executable: String,
    pub architecture: String,
}

impl ManifestData {
    fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| WinappError::Manifest(format!("invalid manifest values: {}", e)))?;
        if !self
            .package_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        {
            return Err(WinappError::invalid_input(
                "package-name",
                "only letters, digits, '.' and '-' are allowed",
            ));
        }
        Ok(())
    }
}

/// Asks the user for a value, offering a default.
pub trait Prompter {
    fn prompt(&self, label: &str, default: &str) -> Result<String>;
}

/// Interactive terminal prompts.
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn prompt(&self, label: &str, default: &str) -> Result<String> {
        Input::with_theme(&ColorfulTheme::default())
            .with_prompt(label)
            .default(default.to_string())
            .interact_text()
            .map_err(|e| WinappError::InvalidInput(format!("prompt failed: {}", e)))
    }
}

/// Accepts every default without asking.
pub struct DefaultsPrompter;

impl Prompter for DefaultsPrompter {
    fn prompt(&self, _label: &str, default: &str) -> Result<String> {
        Ok(default.to_string())
    }
}

/// The `<Identity>` element of an existing manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIdentity {
    pub name: String,
    pub publisher: String,
    pub version: String,
    pub architecture: Option<String>,
}

pub struct ManifestService {
    templates: TemplateRenderer,
}

impl ManifestService {
    pub fn new() -> Result<Self> {
        Ok(Self {
            templates: TemplateRenderer::new()?,
        })
    }

    /// Renders `appxmanifest.xml` into `dir` and returns its path.
    pub fn generate_manifest(
        &self,
        ctx: &TaskContext,
        dir: &Path,
        options: &ManifestOptions,
        prompter: &dyn Prompter,
    ) -> Result<PathBuf> {
        ctx.check()?;
        let target = dir.join(MANIFEST_FILE_NAME);
        if target.exists() && !options.force {
            return Err(WinappError::Manifest(format!(
                "{} already exists (use --force to overwrite)",
                target.display()
            )));
        }

        let data = self.resolve(dir, options, prompter)?;
        data.check()?;
        let xml = self.render(options.template, &data)?;

        fs::create_dir_all(dir)?;
        fs::write(&target, xml)?;
        info!("Generated {}", target.display());
        Ok(target)
    }

    pub fn render(&self, template: ManifestTemplate, data: &ManifestData) -> Result<String> {
        self.templates.render(template.template_name(), data)
    }

    fn resolve(&self, dir: &Path, options: &ManifestOptions, prompter: &dyn Prompter) -> Result<ManifestData> {
        let ask = |label: &str, given: &Option<String>, default: String| -> Result<String> {
            match given {
                Some(value) => Ok(value.trim().to_string()),
                None if options.use_defaults => Ok(default),
                None => Ok(prompter.prompt(label, &default)?.trim().to_string()),
            }
        };

        let package_name = ask("Package name", &options.package_name, default_package_name(dir))?;
        let publisher = normalize_publisher(&ask("Publisher", &options.publisher, default_publisher())?)?;
        let version = normalize_version(&ask("Version", &options.version, DEFAULT_VERSION.to_string())?)?;
        let description = ask("Description", &options.description, package_name.clone())?;
        let executable = ask("Executable", &options.executable, format!("{}.exe", package_name))?;

        let publisher_display_name = publisher.trim_start_matches("CN=").to_string();
        debug!("Resolved manifest identity {} {} {}", package_name, publisher, version);
        Ok(ManifestData {
            display_name: package_name.clone(),
            package_name,
            publisher,
            publisher_display_name,
            version,
            description,
            executable,
            architecture: host_arch().to_string(),
        })
    }
}

fn default_package_name(dir: &Path) -> String {
    let name: String = dir
        .canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(dir)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .take(50)
        .collect();
    if name.len() < 3 {
        "WinApp".to_string()
    } else {
        name
    }
}

fn default_publisher() -> String {
    let user = std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "Developer".to_string());
    format!("CN={}", user)
}

/// Ensures a publisher is a distinguished name (`CN=…`).
pub fn normalize_publisher(publisher: &str) -> Result<String> {
    let trimmed = publisher.trim();
    if trimmed.is_empty() {
        return Err(WinappError::invalid_input("publisher", "cannot be empty"));
    }
    if trimmed.get(..3).is_some_and(|head| head.eq_ignore_ascii_case("CN=")) {
        Ok(format!("CN={}", &trimmed[3..]))
    } else {
        Ok(format!("CN={}", trimmed))
    }
}

/// Converts a version to the four-part `major.minor.build.revision` form.
///
/// Missing parts become `0`; a `-prerelease` or `+build` suffix is dropped.
pub fn normalize_version(version: &str) -> Result<String> {
    let trimmed = version.trim().trim_start_matches(['v', 'V']);
    let core = trimmed.split(['-', '+']).next().unwrap_or_default();
    if core.is_empty() {
        return Err(WinappError::invalid_input("version", "cannot be empty"));
    }
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 4 {
        return Err(WinappError::invalid_input(
            "version",
            format!("'{}' has more than four parts", version),
        ));
    }
    let mut numbers = Vec::with_capacity(4);
    for part in &parts {
        let n: u16 = part.parse().map_err(|_| {
            WinappError::invalid_input("version", format!("'{}' is not a number in '{}'", part, version))
        })?;
        numbers.push(n.to_string());
    }
    numbers.resize(4, "0".to_string());
    Ok(numbers.join("."))
}

/// Reads the `<Identity>` element of a manifest.
pub fn read_identity(path: &Path) -> Result<ManifestIdentity> {
    let xml = fs::read_to_string(path)?;
    parse_identity(&xml)
        .ok_or_else(|| WinappError::Manifest(format!("no <Identity> element in {}", path.display())))
}

pub fn parse_identity(xml: &str) -> Option<ManifestIdentity> {
    let start = xml.find("<Identity")?;
    let rest = &xml[start..];
    let tag = &rest[..rest.find('>')?];
    Some(ManifestIdentity {
        name: attribute(tag, "Name")?,
        publisher: attribute(tag, "Publisher")?,
        version: attribute(tag, "Version")?,
        architecture: attribute(tag, "ProcessorArchitecture"),
    })
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(found) = tag[search..].find(name) {
        let at = search + found;
        search = at + name.len();
        let preceded_by_space = tag[..at].chars().last().is_some_and(char::is_whitespace);
        let after = tag[search..].trim_start();
        let Some(after_eq) = after.strip_prefix('=') else {
            continue;
        };
        if !preceded_by_space {
            continue;
        }
        let after_eq = after_eq.trim_start();
        let quote = after_eq.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value = &after_eq[1..];
        let end = value.find(quote)?;
        return Some(xml_unescape(&value[..end]));
    }
    None
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
