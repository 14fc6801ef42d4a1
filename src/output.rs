//! Output formatting utilities for the winapp CLI.
//!
//! Colored message helpers used by the command handlers, plus the results
//! table printed after `restore` and `update`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use winapp::output::{success, warning};
//!
//! success("Restored 3 packages");
//! warning("winapp.yaml has no packages");
//! ```

use colored::Colorize;
use tabular::{Row, Table};

use crate::services::InstallReport;

/// Print a success message in green with a checkmark
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message in red with an X mark
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message in yellow with a warning sign, to stderr
pub fn warning(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Format a package id with emphasis
///
/// # Examples
///
/// ```rust
/// use winapp::output::package_name;
///
/// let formatted = package_name("Microsoft.WindowsAppSDK");
/// println!("Installing {}", formatted);
/// ```
pub fn package_name(name: &str) -> String {
    name.cyan().to_string()
}

pub fn path(p: &std::path::Path) -> String {
    p.display().to_string().magenta().to_string()
}

pub fn count(n: usize) -> String {
    n.to_string().bold().to_string()
}

/// One row per requested package: status mark, id, version, and the failure
/// message if any. Dependencies pulled in by nuget are not listed.
#[must_use]
pub fn report_table(report: &InstallReport) -> Table {
    let mut table = Table::new("{:<} {:<} {:<} {:<}");
    for (package, version) in &report.resolved {
        let failure = report.failures.iter().find(|f| &f.package == package);
        let skipped = report.skipped.iter().any(|s| s == package);
        let (mark, note) = match (failure, skipped) {
            (Some(f), _) => ("✗".red().to_string(), f.message.clone()),
            (None, true) => ("⊘".yellow().to_string(), "skipped".to_string()),
            (None, false) => ("✓".green().to_string(), String::new()),
        };
        table.add_row(
            Row::new()
                .with_cell(mark)
                .with_cell(package)
                .with_cell(version)
                .with_cell(note),
        );
    }
    for failure in report.failures.iter().filter(|f| f.version.is_none()) {
        if report.resolved.contains_key(&failure.package) {
            continue;
        }
        table.add_row(
            Row::new()
                .with_cell("✗".red().to_string())
                .with_cell(&failure.package)
                .with_cell("?")
                .with_cell(&failure.message),
        );
    }
    for package in &report.skipped {
        if report.resolved.contains_key(package) {
            continue;
        }
        table.add_row(
            Row::new()
                .with_cell("⊘".yellow().to_string())
                .with_cell(package)
                .with_cell("?")
                .with_cell("skipped"),
        );
    }
    table
}
