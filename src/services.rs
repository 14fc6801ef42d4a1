//! Domain services coordinating external tools and project files.
//!
//! Every asynchronous operation takes a [`TaskContext`](crate::context::TaskContext)
//! so it can be cancelled and logs under its caller's span.

pub mod cache;
pub mod certificate;
pub mod cppwinrt;
pub mod dotnet;
pub mod gitignore;
pub mod makepri;
pub mod manifest;
pub mod nuget;
pub mod package_installation;
pub mod packaging;
pub mod status;
pub mod winapp_directory;

pub use cache::CacheService;
pub use certificate::{CertificateRequest, CertificateService, IfExists};
pub use cppwinrt::CppWinrtService;
pub use dotnet::{DotNetPackage, DotNetService};
pub use gitignore::update_gitignore;
pub use makepri::MakePriService;
pub use manifest::{ManifestIdentity, ManifestOptions, ManifestService, ManifestTemplate, Prompter};
pub use nuget::{NugetService, PackageFeed};
pub use package_installation::{InstallOptions, InstallPhase, InstallReport, PackageInstallationService};
pub use packaging::{PackageRequest, PackagingService};
pub use status::StatusService;
pub use winapp_directory::WinappDirectory;
