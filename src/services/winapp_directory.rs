//! Resolution of the global `~/.winapp` directory, the package cache and
//! project-local `.winapp` directories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::configuration::env::{default_home, Settings, GLOBAL_DIR_NAME};
use crate::errors::{Result, WinappError};

pub const LOCAL_DIR_NAME: &str = ".winapp";
const PACKAGES_DIR_NAME: &str = "packages";
const TOOLS_DIR_NAME: &str = "tools";
const CACHE_POINTER_FILE: &str = "cache-location";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinappDirectory {
    global: PathBuf,
}

impl WinappDirectory {
    pub fn new(global: impl Into<PathBuf>) -> Self {
        Self {
            global: global.into(),
        }
    }

    /// Uses `Settings::home` when set, otherwise `~/.winapp`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings
            .home
            .clone()
            .or_else(default_home)
            .map(Self::new)
            .ok_or_else(|| {
                WinappError::Config(format!(
                    "cannot determine home directory for {}; set WINAPP_HOME",
                    GLOBAL_DIR_NAME
                ))
            })
    }

    pub fn global_dir(&self) -> &Path {
        &self.global
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.global.join(TOOLS_DIR_NAME)
    }

    pub fn default_packages_dir(&self) -> PathBuf {
        self.global.join(PACKAGES_DIR_NAME)
    }

    pub fn cache_pointer_file(&self) -> PathBuf {
        self.global.join(CACHE_POINTER_FILE)
    }

    /// The package cache: the location recorded in the pointer file, if any,
    /// else `<global>/packages`.
    pub fn packages_dir(&self) -> PathBuf {
        match fs::read_to_string(self.cache_pointer_file()) {
            Ok(contents) if !contents.trim().is_empty() => PathBuf::from(contents.trim()),
            _ => self.default_packages_dir(),
        }
    }

    /// Records a relocated package cache.
    pub fn set_packages_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.global)?;
        debug!("Recording package cache location {}", path.display());
        fs::write(self.cache_pointer_file(), path.to_string_lossy().as_bytes())?;
        Ok(())
    }

    /// Forgets a relocated cache, returning to the default location.
    pub fn reset_packages_dir(&self) -> Result<()> {
        match fs::remove_file(self.cache_pointer_file()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn ensure_global(&self) -> Result<()> {
        fs::create_dir_all(&self.global)?;
        Ok(())
    }

    /// `<root>/.winapp`.
    pub fn local_dir(root: &Path) -> PathBuf {
        root.join(LOCAL_DIR_NAME)
    }

    /// Walks up from `start` to the nearest project `.winapp` directory,
    /// ignoring the global directory.
    pub fn find_local_dir(&self, start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(Self::local_dir)
            .find(|candidate| candidate.is_dir() && candidate != &self.global)
    }
}
