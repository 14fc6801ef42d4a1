//! Error types for winapp.
//!
//! Every service returns [`Result<T>`] with [`WinappError`]. External tool
//! failures carry the exit code and the extracted error text so callers can
//! decide whether to abort or continue; cancellation has its own variant and
//! is never reported as a tool failure.

use thiserror::Error;

/// The main error type for winapp operations.
#[derive(Debug, Error)]
pub enum WinappError {
    /// Settings or configuration file problems
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O operation failures
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// An external executable could not be located
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// An external executable ran and exited unsuccessfully
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    ToolFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// The operation observed a cancellation request
    #[error("Operation cancelled")]
    Cancelled,

    /// Network-related errors (NuGet feed, downloads)
    #[error("Network error: {0}")]
    Network(String),

    /// Package resolution or installation errors
    #[error("Package error: {0}")]
    Package(String),

    /// Manifest generation or parsing errors
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Certificate generation, installation or signing errors
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Template rendering or parsing errors
    #[error("Template error: {0}")]
    Template(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Task join or locking errors
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

/// A type alias for Results that use WinappError.
pub type Result<T> = std::result::Result<T, WinappError>;

impl WinappError {
    /// Creates a new ToolFailed error.
    pub fn tool_failed<S1, S2>(tool: S1, exit_code: i32, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        WinappError::ToolFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Creates a new Package error with context.
    pub fn package<S1, S2>(package: S1, msg: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        WinappError::Package(format!("{}: {}", package.into(), msg.into()))
    }

    /// Creates a new InvalidInput error with context.
    pub fn invalid_input<S1, S2>(field: S1, reason: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        WinappError::InvalidInput(format!("{}: {}", field.into(), reason.into()))
    }

    /// Returns true if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WinappError::Cancelled)
    }

    /// Returns the error category as a string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            WinappError::Config(_) => "config",
            WinappError::Io(_) => "io",
            WinappError::ToolNotFound(_) => "tool_not_found",
            WinappError::ToolFailed { .. } => "tool_failed",
            WinappError::Cancelled => "cancelled",
            WinappError::Network(_) => "network",
            WinappError::Package(_) => "package",
            WinappError::Manifest(_) => "manifest",
            WinappError::Certificate(_) => "certificate",
            WinappError::Template(_) => "template",
            WinappError::InvalidInput(_) => "invalid_input",
            WinappError::Concurrency(_) => "concurrency",
        }
    }

    /// Process exit code the binary reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            WinappError::Cancelled => 130,
            WinappError::ToolFailed { exit_code, .. } if *exit_code > 0 => *exit_code,
            WinappError::InvalidInput(_) => 2,
            _ => 1,
        }
    }
}

impl From<config::ConfigError> for WinappError {
    fn from(err: config::ConfigError) -> Self {
        WinappError::Config(err.to_string())
    }
}

impl From<minijinja::Error> for WinappError {
    fn from(err: minijinja::Error) -> Self {
        WinappError::Template(err.to_string())
    }
}

impl From<serde_json::Error> for WinappError {
    fn from(err: serde_json::Error) -> Self {
        WinappError::Package(format!("Invalid JSON: {}", err))
    }
}

impl From<tokio::task::JoinError> for WinappError {
    fn from(err: tokio::task::JoinError) -> Self {
        WinappError::Concurrency(format!("Task join error: {}", err))
    }
}
