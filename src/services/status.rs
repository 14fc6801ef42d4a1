//! Spinner-style progress for long-running operations.

use std::future::Future;
use std::io::IsTerminal;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::configuration::Settings;
use crate::errors::Result;

#[derive(Debug, Clone, Copy)]
pub struct StatusService {
    enabled: bool,
}

impl StatusService {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Spinners are shown only on an interactive stderr, unless disabled.
    pub fn from_settings(settings: &Settings, quiet: bool) -> Self {
        Self::new(!settings.no_progress && !quiet && std::io::stderr().is_terminal())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Awaits `task` under a spinner and returns its result unchanged.
    pub async fn execute_with_status<T, F>(&self, message: impl Into<String>, task: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let message = message.into();
        let bar = self.spinner(&message);
        let result = task.await;
        match &result {
            Ok(_) => bar.finish_with_message(format!("{} {}", "✓".green(), message)),
            Err(e) if e.is_cancelled() => {
                bar.abandon_with_message(format!("{} {} (cancelled)", "⊘".yellow(), message))
            }
            Err(_) => bar.abandon_with_message(format!("{} {}", "✗".red(), message)),
        }
        result
    }

    fn spinner(&self, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }
}
