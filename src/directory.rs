use std::path::{Path, PathBuf};

use crate::errors::Result;

/// Supplies the working directory used to resolve project-relative paths.
pub trait CurrentDirectory {
    fn current_dir(&self) -> Result<PathBuf>;
}

/// The process working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessDirectory;

impl CurrentDirectory for ProcessDirectory {
    fn current_dir(&self) -> Result<PathBuf> {
        Ok(std::env::current_dir()?)
    }
}

/// A fixed directory, for tests and for `--root` style overrides.
#[derive(Debug, Clone)]
pub struct FixedDirectory(PathBuf);

impl FixedDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl CurrentDirectory for FixedDirectory {
    fn current_dir(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}
