//! NuGet package installation and version lookup.
//!
//! Installs go through `nuget.exe`, which is downloaded into the global tools
//! directory on first use. Version lookups read the NuGet v3 flat-container
//! index directly.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::context::TaskContext;
use crate::errors::{Result, WinappError};
use crate::process::CommandRunner;
use crate::services::winapp_directory::WinappDirectory;
use crate::tools::ToolService;

pub const NUGET_EXE_URL: &str = "https://dist.nuget.org/win-x86-commandline/latest/nuget.exe";
pub const DEFAULT_FLAT_CONTAINER: &str = "https://api.nuget.org/v3-flatcontainer";
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Where packages come from. Implemented by [`NugetService`]; tests supply fakes.
pub trait PackageFeed: Send + Sync {
    /// Installs `package` at `version` into `output_dir`, returning every
    /// package id and version that ended up installed (dependencies included).
    fn install(
        &self,
        ctx: &TaskContext,
        package: &str,
        version: &str,
        output_dir: &Path,
    ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send;

    fn latest_version(
        &self,
        ctx: &TaskContext,
        package: &str,
        prerelease: bool,
    ) -> impl Future<Output = Result<String>> + Send;
}

impl<T: PackageFeed> PackageFeed for &T {
    fn install(
        &self,
        ctx: &TaskContext,
        package: &str,
        version: &str,
        output_dir: &Path,
    ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send {
        (**self).install(ctx, package, version, output_dir)
    }

    fn latest_version(
        &self,
        ctx: &TaskContext,
        package: &str,
        prerelease: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).latest_version(ctx, package, prerelease)
    }
}

#[derive(Debug, Deserialize)]
struct VersionIndex {
    versions: Vec<String>,
}

pub struct NugetService<R> {
    tools: ToolService<R>,
    dirs: WinappDirectory,
    source: Option<String>,
    flat_container: String,
}

impl<R: CommandRunner> NugetService<R> {
    pub fn new(tools: ToolService<R>, dirs: WinappDirectory) -> Self {
        Self {
            tools,
            dirs,
            source: None,
            flat_container: DEFAULT_FLAT_CONTAINER.to_string(),
        }
    }

    /// Passes `-Source` to every install.
    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_flat_container(mut self, base_url: impl Into<String>) -> Self {
        self.flat_container = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Path of `nuget.exe`, downloading it into the tools directory if needed.
    pub async fn ensure_nuget(&self, ctx: &TaskContext) -> Result<PathBuf> {
        if let Ok(found) = self.tools.locate_program("nuget") {
            return Ok(found);
        }
        let target = self.dirs.tools_dir().join("nuget.exe");
        if target.is_file() {
            return Ok(target);
        }

        info!("Downloading nuget.exe to {}", target.display());
        let bytes = ctx
            .run_cancellable(async {
                tokio::task::spawn_blocking(|| http_get(NUGET_EXE_URL).map(|r| r.into_bytes())).await?
            })
            .await?;
        tokio::fs::create_dir_all(self.dirs.tools_dir()).await?;
        let partial = target.with_extension("exe.partial");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &target).await?;
        Ok(target)
    }

    /// Runs `nuget install` and reports what was installed.
    pub async fn install_package(
        &self,
        ctx: &TaskContext,
        working_dir: &Path,
        package: &str,
        version: &str,
        output_dir: &Path,
    ) -> Result<BTreeMap<String, String>> {
        let nuget = self.ensure_nuget(ctx).await?;
        let mut args = vec![
            "install".to_string(),
            package.to_string(),
            "-Version".to_string(),
            version.to_string(),
            "-OutputDirectory".to_string(),
            output_dir.to_string_lossy().into_owned(),
            "-NonInteractive".to_string(),
        ];
        if let Some(source) = &self.source {
            args.extend(["-Source".to_string(), source.clone()]);
        }

        debug!("Installing {} {}", package, version);
        let output = self
            .tools
            .run_program(ctx, nuget, args, Some(working_dir))
            .await?;
        if !output.success() {
            return Err(WinappError::tool_failed("nuget", output.exit_code, output.combined()));
        }

        let mut installed = parse_installed(&output.stdout);
        let requested_present = installed.keys().any(|k| k.eq_ignore_ascii_case(package));
        if !requested_present {
            if output_dir.join(format!("{}.{}", package, version)).is_dir() {
                installed.insert(package.to_string(), version.to_string());
            } else {
                return Err(WinappError::package(
                    package,
                    format!("{} not found in {} after install", version, output_dir.display()),
                ));
            }
        }
        Ok(installed)
    }

    /// Highest version published on the feed.
    pub async fn get_latest_version(&self, ctx: &TaskContext, package: &str, prerelease: bool) -> Result<String> {
        let url = format!("{}/{}/index.json", self.flat_container, package.to_ascii_lowercase());
        debug!("Querying {}", url);
        let body = ctx
            .run_cancellable(async move {
                tokio::task::spawn_blocking(move || http_get(&url).and_then(HttpBody::into_string)).await?
            })
            .await?;
        let index: VersionIndex = serde_json::from_str(&body)?;
        select_latest(&index.versions, prerelease)
            .map(str::to_string)
            .ok_or_else(|| WinappError::package(package, "no matching versions on feed"))
    }
}

impl<R: CommandRunner> PackageFeed for NugetService<R> {
    fn install(
        &self,
        ctx: &TaskContext,
        package: &str,
        version: &str,
        output_dir: &Path,
    ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send {
        self.install_package(ctx, output_dir, package, version, output_dir)
    }

    fn latest_version(
        &self,
        ctx: &TaskContext,
        package: &str,
        prerelease: bool,
    ) -> impl Future<Output = Result<String>> + Send {
        self.get_latest_version(ctx, package, prerelease)
    }
}

struct HttpBody(Vec<u8>);

impl HttpBody {
    fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    fn into_string(self) -> Result<String> {
        String::from_utf8(self.0).map_err(|e| WinappError::Network(format!("invalid UTF-8 in response: {}", e)))
    }
}

fn http_get(url: &str) -> Result<HttpBody> {
    let response = minreq::get(url)
        .with_timeout(HTTP_TIMEOUT_SECS)
        .send()
        .map_err(|e| WinappError::Network(format!("{}: {}", url, e)))?;
    let status = response.status_code;
    match status {
        200..=299 => Ok(HttpBody(response.into_bytes())),
        404 => Err(WinappError::Network(format!("{} not found (404)", url))),
        code => Err(WinappError::Network(format!(
            "{} returned {} {}",
            url, code, response.reason_phrase
        ))),
    }
}

/// Collects `Successfully installed 'Name Version'` and
/// `Package "Name.Version" is already installed.` lines.
pub fn parse_installed(stdout: &str) -> BTreeMap<String, String> {
    const INSTALLED: &str = "Successfully installed '";
    const ALREADY: &str = "Package \"";
    let mut installed = BTreeMap::new();
    for line in stdout.lines() {
        let entry = if let Some(start) = line.find(INSTALLED) {
            let rest = &line[start + INSTALLED.len()..];
            match rest.find('\'') {
                Some(end) => rest[..end]
                    .trim()
                    .rsplit_once(' ')
                    .map(|(name, version)| (name.to_string(), version.to_string())),
                None => {
                    warn!("Unterminated nuget output line: {}", line);
                    None
                }
            }
        } else if let Some(start) = line.find(ALREADY).filter(|_| line.contains("is already installed")) {
            let rest = &line[start + ALREADY.len()..];
            rest.find('"').and_then(|end| split_package_id(&rest[..end]))
        } else {
            None
        };
        if let Some((name, version)) = entry {
            installed.insert(name, version);
        }
    }
    installed
}

/// Splits `Name.1.2.3` at the first dot-separated part starting with a digit.
fn split_package_id(id: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = id.trim().split('.').collect();
    let at = parts
        .iter()
        .position(|p| p.starts_with(|c: char| c.is_ascii_digit()))
        .filter(|&i| i > 0)?;
    Some((parts[..at].join("."), parts[at..].join(".")))
}

/// Highest version by NuGet ordering, skipping prereleases unless allowed.
pub fn select_latest(versions: &[String], prerelease: bool) -> Option<&str> {
    versions
        .iter()
        .map(String::as_str)
        .filter(|v| prerelease || !v.contains('-'))
        .max_by(|a, b| compare_versions(a, b))
}

/// Compares NuGet/SemVer-style versions: numeric release parts first (missing
/// parts count as zero), then a release sorts above any prerelease of it.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |v: &str| {
        let v = v.split('+').next().unwrap_or_default();
        match v.split_once('-') {
            Some((core, pre)) => (core.to_string(), Some(pre.to_string())),
            None => (v.to_string(), None),
        }
    };
    let (core_a, pre_a) = split(a);
    let (core_b, pre_b) = split(b);

    let nums = |core: &str| -> Vec<u64> { core.split('.').map(|p| p.parse().unwrap_or(0)).collect() };
    let (na, nb) = (nums(&core_a), nums(&core_b));
    for i in 0..na.len().max(nb.len()) {
        let ord = na.get(i).unwrap_or(&0).cmp(nb.get(i).unwrap_or(&0));
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (pre_a, pre_b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(pa), Some(pb)) => compare_prerelease(&pa, &pb),
    }
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ToolOutput;
    use crate::testing::{mock_tools, MockRunner};
    use rstest::rstest;
    use tempfile::TempDir;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("1.7.250401001", "1.6.250205002", Ordering::Greater)]
    #[case("1.10.0", "1.9.0", Ordering::Greater)]
    #[case("1.0", "1.0.0.0", Ordering::Equal)]
    #[case("2.0.0-preview1", "2.0.0", Ordering::Less)]
    #[case("2.0.0-preview.10", "2.0.0-preview.9", Ordering::Greater)]
    #[case("2.0.0-alpha", "2.0.0-beta", Ordering::Less)]
    #[case("1.0.0+build5", "1.0.0", Ordering::Equal)]
    fn test_compare_versions(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        assert_eq!(compare_versions(a, b), expected);
    }

    #[test]
    fn test_select_latest() {
        let versions = strings(&["1.6.0", "1.7.0", "1.8.0-preview1", "1.10.0-experimental"]);
        assert_eq!(select_latest(&versions, false), Some("1.7.0"));
        assert_eq!(select_latest(&versions, true), Some("1.10.0-experimental"));
        assert_eq!(select_latest(&strings(&["1.0.0-beta"]), false), None);
        assert_eq!(select_latest(&[], true), None);
    }

    #[test]
    fn test_parse_installed_lines() {
        let stdout = "Feeds used:\n  https://api.nuget.org/v3/index.json\n\
            Installing package 'Microsoft.WindowsAppSDK' to 'C:\\pkgs'.\n\
            Successfully installed 'Microsoft.Windows.SDK.BuildTools 10.0.26100.1742' to C:\\pkgs\n\
            Successfully installed 'Microsoft.WindowsAppSDK 1.7.250401001' to C:\\pkgs\n\
            Executing nuget actions took 1.2 sec\n";
        let installed = parse_installed(stdout);
        assert_eq!(installed.len(), 2);
        assert_eq!(installed["Microsoft.WindowsAppSDK"], "1.7.250401001");
        assert_eq!(installed["Microsoft.Windows.SDK.BuildTools"], "10.0.26100.1742");
    }

    #[test]
    fn test_parse_already_installed_lines() {
        let stdout = "Package \"Microsoft.Windows.SDK.BuildTools.10.0.26100.1742\" is already installed.\n\
            Successfully installed 'Microsoft.WindowsAppSDK 1.7.250401001' to C:\\pkgs\n\
            Package \"Microsoft.Web.WebView2.1.0.2903.40\" is already installed.\n";
        let installed = parse_installed(stdout);
        assert_eq!(installed.len(), 3);
        assert_eq!(installed["Microsoft.Windows.SDK.BuildTools"], "10.0.26100.1742");
        assert_eq!(installed["Microsoft.Web.WebView2"], "1.0.2903.40");
        assert_eq!(installed["Microsoft.WindowsAppSDK"], "1.7.250401001");
    }

    #[test]
    fn test_split_package_id() {
        assert_eq!(
            split_package_id("Microsoft.WindowsAppSDK.1.7.250401001-preview1"),
            Some(("Microsoft.WindowsAppSDK".to_string(), "1.7.250401001-preview1".to_string()))
        );
        assert_eq!(split_package_id("NoVersion"), None);
        assert_eq!(split_package_id("1.0.0"), None);
    }

    #[tokio::test]
    async fn test_install_package_arguments_and_result() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::with_responses([ToolOutput::new(
            0,
            "Successfully installed 'Contoso.App 1.2.3' to out\n",
            "",
        )]);
        let service = NugetService::new(mock_tools(&runner), WinappDirectory::new(temp.path()))
            .with_source(Some("https://feed.test/v3/index.json".to_string()));

        let installed = service
            .install_package(&TaskContext::new("nuget"), temp.path(), "Contoso.App", "1.2.3", temp.path())
            .await
            .unwrap();
        assert_eq!(installed["Contoso.App"], "1.2.3");

        let args = runner.args_of(0);
        assert_eq!(&args[..4], ["install", "Contoso.App", "-Version", "1.2.3"]);
        assert!(args.contains(&"-NonInteractive".to_string()));
        assert_eq!(&args[args.len() - 2..], ["-Source", "https://feed.test/v3/index.json"]);
    }

    #[tokio::test]
    async fn test_install_reports_already_installed_package() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("Contoso.App.1.2.3")).unwrap();
        let runner = MockRunner::with_responses([ToolOutput::new(
            0,
            "Package \"Contoso.App.1.2.3\" is already installed.",
            "",
        )]);
        let service = NugetService::new(mock_tools(&runner), WinappDirectory::new(temp.path()));

        let installed = service
            .install(&TaskContext::new("nuget"), "Contoso.App", "1.2.3", temp.path())
            .await
            .unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed["Contoso.App"], "1.2.3");
    }

    #[tokio::test]
    async fn test_install_failure_is_tool_failure() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::with_responses([ToolOutput::new(
            1,
            "",
            "Unable to find version '9.9.9' of package 'Contoso.App'.",
        )]);
        let service = NugetService::new(mock_tools(&runner), WinappDirectory::new(temp.path()));

        let err = service
            .install(&TaskContext::new("nuget"), "Contoso.App", "9.9.9", temp.path())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "tool_failed");
        assert!(err.to_string().contains("Unable to find version"));
    }
}
