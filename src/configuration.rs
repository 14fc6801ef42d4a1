//! The `winapp.yaml` configuration store.
//!
//! The file holds a list of pinned packages in a small, fixed YAML subset:
//!
//! ```text
//! packages:
//!   - name: Microsoft.WindowsAppSDK
//!     version: 1.7.250401001
//! ```
//!
//! Reading is permissive: lines are matched by prefix, keywords are
//! case-insensitive, and anything unrecognized is skipped rather than
//! reported as an error. Writing always produces the canonical layout above.
//!
//! # Examples
//!
//! ```rust
//! use winapp::configuration::{PackagePin, WinappConfig};
//!
//! let config = WinappConfig::parse("packages:\n  - name: Contoso.App\n    version: 1.2.3\n");
//! assert_eq!(config.packages, vec![PackagePin::new("Contoso.App", "1.2.3")]);
//! assert_eq!(WinappConfig::parse(&config.to_yaml_string()), config);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::directory::CurrentDirectory;
use crate::errors::Result;

pub mod env;

pub use env::Settings;

/// File name of the project configuration, resolved in the working directory.
pub const CONFIG_FILE_NAME: &str = "winapp.yaml";

const PACKAGES_HEADER: &str = "packages:";
const LIST_NAME_KEY: &str = "- name:";
const NAME_KEY: &str = "name:";
const VERSION_KEY: &str = "version:";

/// A pinned dependency version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackagePin {
    pub name: String,
    pub version: String,
}

impl PackagePin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Root configuration: an ordered list of package pins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinappConfig {
    pub packages: Vec<PackagePin>,
}

/// Why a line did not contribute to the parsed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The line matched none of the known forms.
    Unrecognized,
    /// A `version:` line appeared with no pending `name:`.
    OrphanVersion,
    /// A `name:` was superseded or never followed by a `version:`, or was empty.
    IncompleteEntry,
}

/// A line dropped while parsing. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_number: usize,
    pub content: String,
    pub reason: SkipReason,
}

/// Parse result with diagnostics. The configuration is identical to what
/// [`WinappConfig::parse`] returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub config: WinappConfig,
    pub skipped: Vec<SkippedLine>,
}

impl WinappConfig {
    pub fn new(packages: Vec<PackagePin>) -> Self {
        Self { packages }
    }

    /// Parses configuration text. Never fails; malformed lines are dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::parse_with_diagnostics(text).config
    }

    /// Parses configuration text and reports every line that was dropped.
    #[must_use]
    pub fn parse_with_diagnostics(text: &str) -> ParseReport {
        let mut report = ParseReport::default();
        // (line number, name) of the entry waiting for its version
        let mut pending: Option<(usize, String)> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.eq_ignore_ascii_case(PACKAGES_HEADER) {
                continue;
            }

            let name_value =
                strip_prefix_ignore_case(line, LIST_NAME_KEY).or_else(|| strip_prefix_ignore_case(line, NAME_KEY));

            if let Some(value) = name_value {
                if let Some((previous_line, previous)) = pending.take() {
                    report.skipped.push(SkippedLine {
                        line_number: previous_line,
                        content: previous,
                        reason: SkipReason::IncompleteEntry,
                    });
                }
                let name = unquote(value);
                if name.is_empty() {
                    report.skipped.push(SkippedLine {
                        line_number,
                        content: line.to_string(),
                        reason: SkipReason::IncompleteEntry,
                    });
                } else {
                    pending = Some((line_number, name.to_string()));
                }
                continue;
            }

            if let Some(value) = strip_prefix_ignore_case(line, VERSION_KEY) {
                match pending.take() {
                    Some((_, name)) => {
                        let version = unquote(value).to_string();
                        trace!("Parsed pin {} = {}", name, version);
                        report.config.packages.push(PackagePin { name, version });
                    }
                    None => report.skipped.push(SkippedLine {
                        line_number,
                        content: line.to_string(),
                        reason: SkipReason::OrphanVersion,
                    }),
                }
                continue;
            }

            report.skipped.push(SkippedLine {
                line_number,
                content: line.to_string(),
                reason: SkipReason::Unrecognized,
            });
        }

        if let Some((line_number, name)) = pending {
            report.skipped.push(SkippedLine {
                line_number,
                content: name,
                reason: SkipReason::IncompleteEntry,
            });
        }

        report
    }

    /// Serializes to the canonical text layout.
    #[must_use]
    pub fn to_yaml_string(&self) -> String {
        let mut out = String::from(PACKAGES_HEADER);
        out.push('\n');
        for pin in &self.packages {
            out.push_str("  - name: ");
            out.push_str(&pin.name);
            out.push('\n');
            out.push_str("    version: ");
            out.push_str(&pin.version);
            out.push('\n');
        }
        out
    }

    /// Version pinned for `name` (NuGet ids compare case-insensitively).
    #[must_use]
    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.packages
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.version.as_str())
    }

    /// Replaces the version of an existing pin in place, or appends a new one.
    pub fn set_version(&mut self, name: &str, version: &str) {
        match self
            .packages
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            Some(pin) => pin.version = version.to_string(),
            None => self.packages.push(PackagePin::new(name, version)),
        }
    }

    /// Removes every pin named `name`. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.packages.len();
        self.packages.retain(|p| !p.name.eq_ignore_ascii_case(name));
        before != self.packages.len()
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Trims and strips one layer of matching `"` or `'` quotes.
fn unquote(value: &str) -> &str {
    let value = value.trim();
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Reads and writes `winapp.yaml` at a path fixed at construction.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    /// Resolves `winapp.yaml` against the provider's current directory.
    pub fn new(dir: &impl CurrentDirectory) -> Result<Self> {
        Ok(Self::at(dir.current_dir()?.join(CONFIG_FILE_NAME)))
    }

    /// Uses an explicit configuration file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks the filesystem on every call.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Loads the configuration, or an empty one when the file is missing.
    pub fn load(&self) -> Result<WinappConfig> {
        Ok(self.load_with_diagnostics()?.config)
    }

    pub fn load_with_diagnostics(&self) -> Result<ParseReport> {
        if !self.exists() {
            debug!("No configuration at {}, using empty config", self.path.display());
            return Ok(ParseReport::default());
        }

        debug!("Loading configuration from: {}", self.path.display());
        let text = fs::read_to_string(&self.path)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        let report = WinappConfig::parse_with_diagnostics(text);
        for skipped in &report.skipped {
            trace!(
                "Skipped line {} ({:?}): {}",
                skipped.line_number,
                skipped.reason,
                skipped.content
            );
        }
        Ok(report)
    }

    /// Overwrites the file with the canonical serialization (UTF-8, no BOM).
    /// Parent directories are not created.
    pub fn save(&self, config: &WinappConfig) -> Result<()> {
        debug!(
            "Saving {} package pins to {}",
            config.packages.len(),
            self.path.display()
        );
        fs::write(&self.path, config.to_yaml_string())?;
        Ok(())
    }
}
