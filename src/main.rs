use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing::{debug, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use winapp::commands::{self, InitOptions, Workspace};
use winapp::directory::ProcessDirectory;
use winapp::services::certificate::{DEFAULT_PASSWORD, DEFAULT_TIMESTAMP_URL, DEFAULT_VALID_DAYS, DEV_CERTIFICATE_FILE};
use winapp::services::manifest::{DefaultsPrompter, DialoguerPrompter};
use winapp::services::{CertificateRequest, IfExists, ManifestOptions, ManifestTemplate, PackageRequest, Prompter, StatusService};
use winapp::{BuildTool, CancelToken, ProcessRunner, Settings, TaskContext, WinappError};

/// Scaffold, package, sign and manage dependencies for Windows app projects.
#[derive(Parser)]
#[clap(author, version = clap::crate_version!(), max_term_width = 100, about)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Increase logging level (-v: info, -vv: debug, -vvv: trace)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Hide progress spinners
    #[clap(short, long, global = true)]
    quiet: bool,

    /// Print help in markdown format (for documentation generation)
    #[clap(long, hide = true)]
    markdown_help: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up winapp.yaml, packages, manifest and a development certificate
    Init {
        /// Accept defaults instead of prompting
        #[clap(long)]
        use_defaults: bool,

        /// Only write winapp.yaml
        #[clap(long)]
        config_only: bool,

        /// Leave .gitignore alone
        #[clap(long)]
        no_gitignore: bool,

        /// Do not generate a development certificate
        #[clap(long)]
        no_cert: bool,

        /// Allow prerelease package versions
        #[clap(long)]
        prerelease: bool,
    },
    /// Install the packages pinned in winapp.yaml
    Restore,
    /// Update every pinned package to its latest version
    Update {
        /// Allow prerelease package versions
        #[clap(long)]
        prerelease: bool,
    },
    /// Create an MSIX package from a directory
    Package {
        /// Directory holding the application files
        input_dir: PathBuf,

        /// Output .msix file or directory
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Manifest to package (default: <input-dir>/appxmanifest.xml)
        #[clap(long)]
        manifest: Option<PathBuf>,

        /// Sign the package with this PFX
        #[clap(long)]
        cert: Option<PathBuf>,

        /// Password for --cert
        #[clap(long)]
        cert_password: Option<String>,

        /// Do not generate resources.pri
        #[clap(long)]
        skip_pri: bool,
    },
    /// Work with appxmanifest.xml
    #[clap(subcommand)]
    Manifest(ManifestCommands),
    /// Development certificates
    #[clap(subcommand)]
    Cert(CertCommands),
    /// Sign a file with a PFX certificate
    Sign {
        file: PathBuf,
        pfx: PathBuf,

        #[clap(short, long)]
        password: Option<String>,

        /// RFC 3161 timestamp server
        #[clap(long, num_args = 0..=1, default_missing_value = DEFAULT_TIMESTAMP_URL)]
        timestamp_url: Option<String>,
    },
    /// Run a Windows SDK build tool with the given arguments
    Tool {
        /// makeappx, makepri, signtool, mt or cppwinrt
        tool: BuildTool,

        #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Manage the package cache
    #[clap(subcommand)]
    Cache(CacheCommands),
    /// Print the project (or global) winapp directory
    GetWinappPath {
        /// Print the global directory
        #[clap(long)]
        global: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ManifestCommands {
    /// Generate appxmanifest.xml
    Generate {
        /// Target directory (default: current directory)
        dir: Option<PathBuf>,

        #[clap(long)]
        package_name: Option<String>,

        #[clap(long)]
        publisher: Option<String>,

        #[clap(long)]
        version: Option<String>,

        #[clap(long)]
        description: Option<String>,

        #[clap(long)]
        executable: Option<String>,

        #[clap(long, value_enum, default_value_t)]
        template: ManifestTemplate,

        /// Accept defaults instead of prompting
        #[clap(long)]
        use_defaults: bool,

        /// Overwrite an existing manifest
        #[clap(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum CertCommands {
    /// Generate a self-signed development certificate
    Generate {
        /// Certificate subject (default: the manifest publisher)
        #[clap(long)]
        publisher: Option<String>,

        /// Manifest to read the publisher from
        #[clap(long)]
        manifest: Option<PathBuf>,

        /// Output PFX path
        #[clap(short, long)]
        output: Option<PathBuf>,

        #[clap(long, default_value = DEFAULT_PASSWORD)]
        password: String,

        #[clap(long, default_value_t = DEFAULT_VALID_DAYS)]
        valid_days: u32,

        #[clap(long, value_enum, default_value_t)]
        if_exists: IfExists,
    },
    /// Trust a certificate on this machine (requires elevation)
    Install {
        pfx: PathBuf,

        #[clap(long, default_value = DEFAULT_PASSWORD)]
        password: String,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Print the package cache location
    GetPath,
    /// Move the package cache
    Move { path: PathBuf },
    /// Delete every cached package
    Clear,
}

fn init_tracing(verbose: u8) -> Result<(), anyhow::Error> {
    let log_level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")
}

fn prompter(use_defaults: bool) -> Box<dyn Prompter> {
    if use_defaults || !std::io::stdin().is_terminal() {
        Box::new(DefaultsPrompter)
    } else {
        Box::new(DialoguerPrompter)
    }
}

/// Cancels `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

/// Returns the process exit code.
async fn run() -> Result<i32, anyhow::Error> {
    let cli = Cli::parse();

    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(0);
    }

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            Cli::command().print_help()?;
            return Ok(0);
        }
    };

    if let Commands::Completions { shell } = &command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "winapp", &mut std::io::stdout());
        return Ok(0);
    }

    init_tracing(cli.verbose)?;
    debug!("Argument parsing complete.");

    let settings = Settings::load()?;
    let status = StatusService::from_settings(&settings, cli.quiet);
    let ws = Workspace::from_directory(&ProcessDirectory, settings, status)?;
    let runner = ProcessRunner::new();

    let token = CancelToken::new();
    cancel_on_ctrl_c(token.clone());
    let ctx = |operation: &str| TaskContext::with_token(operation, token.clone());

    match command {
        Commands::Init {
            use_defaults,
            config_only,
            no_gitignore,
            no_cert,
            prerelease,
        } => {
            let options = InitOptions {
                use_defaults,
                config_only,
                no_gitignore,
                no_cert,
                prerelease,
            };
            let feed = ws.nuget(runner)?;
            commands::init_command(&ws, &ctx("init"), runner, feed, &options, prompter(use_defaults).as_ref())
                .await?;
        }
        Commands::Restore => {
            let feed = ws.nuget(runner)?;
            commands::restore_command(&ws, &ctx("restore"), runner, feed).await?;
        }
        Commands::Update { prerelease } => {
            let feed = ws.nuget(runner)?;
            commands::update_command(&ws, &ctx("update"), runner, feed, prerelease).await?;
        }
        Commands::Package {
            input_dir,
            output,
            manifest,
            cert,
            cert_password,
            skip_pri,
        } => {
            let request = PackageRequest {
                input_dir,
                output,
                manifest,
                cert,
                cert_password,
                skip_pri,
            };
            commands::package_command(&ws, &ctx("package"), runner, &request).await?;
        }
        Commands::Manifest(ManifestCommands::Generate {
            dir,
            package_name,
            publisher,
            version,
            description,
            executable,
            template,
            use_defaults,
            force,
        }) => {
            let dir = dir.unwrap_or_else(|| ws.root().to_path_buf());
            let options = ManifestOptions {
                package_name,
                publisher,
                version,
                description,
                executable,
                template,
                use_defaults,
                force,
            };
            commands::manifest_generate_command(&ctx("manifest"), &dir, &options, prompter(use_defaults).as_ref())?;
        }
        Commands::Cert(CertCommands::Generate {
            publisher,
            manifest,
            output,
            password,
            valid_days,
            if_exists,
        }) => {
            let publisher = commands::resolve_publisher(&ws, publisher.as_deref(), manifest.as_deref())?;
            let output = output.unwrap_or_else(|| ws.root().join(DEV_CERTIFICATE_FILE));
            let mut request = CertificateRequest::new(publisher, output);
            request.password = password;
            request.valid_days = valid_days;
            request.if_exists = if_exists;
            commands::cert_generate_command(&ws, &ctx("cert"), runner, &request).await?;
        }
        Commands::Cert(CertCommands::Install { pfx, password }) => {
            commands::cert_install_command(&ws, &ctx("cert"), runner, &pfx, &password).await?;
        }
        Commands::Sign {
            file,
            pfx,
            password,
            timestamp_url,
        } => {
            commands::sign_command(
                &ws,
                &ctx("sign"),
                runner,
                &file,
                &pfx,
                password.as_deref(),
                timestamp_url.as_deref(),
            )
            .await?;
        }
        Commands::Tool { tool, args } => {
            return Ok(commands::tool_command(&ws, &ctx("tool"), runner, tool, &args).await?);
        }
        Commands::Cache(CacheCommands::GetPath) => {
            commands::cache_get_path_command(&ws);
        }
        Commands::Cache(CacheCommands::Move { path }) => {
            commands::cache_move_command(&ws, &ctx("cache"), &path).await?;
        }
        Commands::Cache(CacheCommands::Clear) => {
            commands::cache_clear_command(&ws, &ctx("cache")).await?;
        }
        Commands::GetWinappPath { global } => {
            commands::get_winapp_path_command(&ws, global);
        }
        Commands::Completions { shell: _ } => {
            unreachable!("Completions should be handled before this point");
        }
    }

    Ok(0)
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            let code = err
                .downcast_ref::<WinappError>()
                .map(WinappError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}
