//! winapp - tooling for Windows application projects
//!
//! winapp scaffolds, packages, signs, and manages dependencies for Windows
//! app projects. It drives the external Windows toolchain (NuGet, makepri,
//! makeappx, signtool, cppwinrt, the dotnet CLI and PowerShell certificate
//! cmdlets) and owns the few files a project needs: `winapp.yaml`,
//! `appxmanifest.xml` and a development certificate.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use winapp::{ConfigService, PackagePin, WinappConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ConfigService::at("winapp.yaml");
//! let mut config = store.load()?;
//! config.set_version("Microsoft.WindowsAppSDK", "1.7.250401001");
//! store.save(&config)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`configuration`]: the `winapp.yaml` package-pin store and process settings
//! - [`context`]: cancellation token plus tracing span passed to every async operation
//! - [`process`]: running external executables
//! - [`tools`]: locating and classifying the Windows SDK build tools
//! - [`services`]: the domain services (packages, manifests, certificates, packaging, cache)
//! - [`commands`]: the CLI command handlers

pub mod commands;
pub mod configuration;
pub mod context;
pub mod directory;
pub mod errors;
pub mod output;
pub mod process;
pub mod services;
pub mod templates;
pub mod tools;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use configuration::{ConfigService, PackagePin, ParseReport, Settings, WinappConfig};
pub use context::{CancelToken, TaskContext};
pub use errors::{Result, WinappError};
pub use process::{CommandRunner, ProcessRunner, ToolOutput};
pub use tools::{BuildTool, ToolLocator, ToolService};
