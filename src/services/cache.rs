//! The NuGet package cache: locating, relocating and clearing it.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::services::winapp_directory::WinappDirectory;

#[derive(Debug, Clone)]
pub struct CacheService {
    dirs: WinappDirectory,
}

impl CacheService {
    pub fn new(dirs: WinappDirectory) -> Self {
        Self { dirs }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dirs.packages_dir()
    }

    /// Moves the package cache to `new_path`.
    ///
    /// The cache is copied into a staging directory beside `new_path` first.
    /// Cancellation is checked between entries; on cancellation or any failure
    /// the staging directory is removed and the existing cache is left as it
    /// was. `new_path` must not exist or must be an empty directory. A
    /// relative `new_path` is resolved against the current directory.
    pub async fn move_cache(&self, ctx: &TaskContext, new_path: &Path) -> Result<PathBuf> {
        let old_path = absolute_path(&self.cache_path())?;
        let new_path = absolute_path(new_path)?;
        let new_path = new_path.as_path();
        if new_path == old_path {
            return Err(WinappError::invalid_input(
                "path",
                format!("cache is already at {}", old_path.display()),
            ));
        }
        if new_path.starts_with(&old_path) {
            return Err(WinappError::invalid_input(
                "path",
                "target cannot be inside the current cache",
            ));
        }
        let target_is_empty_dir = ensure_usable_target(new_path).await?;

        let parent = new_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(parent).await?;
        let staging = staging_path(new_path);
        if fs::try_exists(&staging).await? {
            fs::remove_dir_all(&staging).await?;
        }

        info!("Moving package cache {} -> {}", old_path.display(), new_path.display());
        let copied = if fs::try_exists(&old_path).await? {
            match copy_tree(ctx, &old_path, &staging).await {
                Ok(count) => count,
                Err(e) => {
                    debug!("Cache copy aborted ({}), removing staging dir", e.category());
                    if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                        warn!("Could not remove {}: {}", staging.display(), cleanup);
                    }
                    return Err(e);
                }
            }
        } else {
            fs::create_dir_all(&staging).await?;
            0
        };

        if let Err(e) = ctx.check() {
            fs::remove_dir_all(&staging).await?;
            return Err(e);
        }

        if target_is_empty_dir {
            fs::remove_dir(new_path).await?;
        }
        fs::rename(&staging, new_path).await?;
        self.dirs.set_packages_dir(new_path)?;
        debug!("Copied {} files", copied);

        if fs::try_exists(&old_path).await? {
            if let Err(e) = fs::remove_dir_all(&old_path).await {
                warn!("Cache moved but old directory {} remains: {}", old_path.display(), e);
            }
        }
        Ok(new_path.to_path_buf())
    }

    /// Deletes all cached packages. Returns whether there was anything to delete.
    pub async fn clear_cache(&self, ctx: &TaskContext) -> Result<bool> {
        ctx.check()?;
        let path = self.cache_path();
        if !fs::try_exists(&path).await? {
            return Ok(false);
        }
        info!("Clearing package cache at {}", path.display());
        fs::remove_dir_all(&path).await?;
        fs::create_dir_all(&path).await?;
        Ok(true)
    }
}

/// Returns whether the target is an existing empty directory.
async fn ensure_usable_target(path: &Path) -> Result<bool> {
    if !fs::try_exists(path).await? {
        return Ok(false);
    }
    if !fs::metadata(path).await?.is_dir() {
        return Err(WinappError::invalid_input(
            "path",
            format!("{} exists and is not a directory", path.display()),
        ));
    }
    let mut entries = fs::read_dir(path).await?;
    if entries.next_entry().await?.is_some() {
        return Err(WinappError::invalid_input(
            "path",
            format!("{} must be empty", path.display()),
        ));
    }
    Ok(true)
}

/// Absolute form of `path` with `.` and `..` removed lexically.
fn absolute_path(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cache".to_string());
    target.with_file_name(format!(".{}.staging", name))
}

async fn copy_tree(ctx: &TaskContext, from: &Path, to: &Path) -> Result<u64> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    let mut copied = 0;
    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst).await?;
        let mut entries = fs::read_dir(&src).await?;
        while let Some(entry) = entries.next_entry().await? {
            ctx.check()?;
            let target = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target).await?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}
