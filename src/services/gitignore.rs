//! `.gitignore` maintenance.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::Result;
use crate::services::certificate::DEV_CERTIFICATE_FILE;

const IGNORE_ENTRIES: [&str; 2] = [".winapp/", DEV_CERTIFICATE_FILE];

/// Ensures winapp's local state and the development certificate are ignored.
///
/// Creates `.gitignore` when missing. Returns whether the file changed.
pub fn update_gitignore(dir: &Path) -> Result<bool> {
    let path = dir.join(".gitignore");
    let existing = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let present = |entry: &str| {
        let bare = entry.trim_end_matches('/');
        existing.lines().map(str::trim).any(|line| {
            let line = line.trim_start_matches('/');
            line == entry || line == bare
        })
    };
    let missing: Vec<&str> = IGNORE_ENTRIES.into_iter().filter(|e| !present(*e)).collect();
    if missing.is_empty() {
        return Ok(false);
    }

    let mut text = existing.clone();
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str("# winapp\n");
    for entry in &missing {
        text.push_str(entry);
        text.push('\n');
    }
    fs::write(&path, text)?;
    debug!("Added {:?} to {}", missing, path.display());
    Ok(true)
}
