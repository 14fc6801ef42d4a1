//! Process-wide settings from `settings.toml` and `WINAPP_*` environment variables.
//!
//! | Variable                   | Setting             |
//! |----------------------------|---------------------|
//! | `WINAPP_HOME`              | global winapp dir   |
//! | `WINAPP_NUGET_SOURCE`      | NuGet feed URL      |
//! | `WINAPP_NO_PROGRESS`       | disable spinners    |
//! | `WINAPP_TOOL_TIMEOUT_SECS` | external tool limit |
//!
//! Environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;

pub const ENV_PREFIX: &str = "WINAPP";
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
pub const GLOBAL_DIR_NAME: &str = ".winapp";

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overrides the global `~/.winapp` directory.
    pub home: Option<PathBuf>,
    /// NuGet feed used for installs and version lookups.
    pub nuget_source: Option<String>,
    /// Disables progress spinners.
    pub no_progress: bool,
    /// Upper bound for a single external tool run.
    pub tool_timeout_secs: Option<u64>,
}

impl Settings {
    /// Loads settings from the global settings file and the process environment.
    pub fn load() -> Result<Self> {
        let home = std::env::var_os("WINAPP_HOME")
            .map(PathBuf::from)
            .or_else(default_home);
        let file = home.map(|h| h.join(SETTINGS_FILE_NAME));
        Self::load_from(file.as_deref(), None)
    }

    /// Loads settings from an optional file, with `env` standing in for the
    /// process environment when provided.
    pub fn load_from(file: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            debug!("Reading settings from {}", file.display());
            builder = builder.add_source(File::from(file).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );
        let settings: Settings = builder.build()?.try_deserialize()?;
        debug!("Settings: {:?}", settings);
        Ok(settings)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS))
    }
}

/// `~/.winapp`, when a home directory can be determined.
pub fn default_home() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(GLOBAL_DIR_NAME))
}
