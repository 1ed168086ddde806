#![warn(clippy::pedantic)]

//! # tsci
//!
//! Connects an ephemeral CI runner to a Tailscale tailnet: resolves and
//! downloads the Tailscale release for the runner's platform, verifies and
//! installs it, starts `tailscaled`, and runs `tailscale up` under a timeout.
//!
//! ## Subcommands
//!
//! - `up` - Install, start the daemon and connect (what CI jobs run)
//! - `install` - Download, verify and install only
//! - `resolve` - Show which artifact would be installed
//! - `version` - Display version information
//!
//! ## Configuration
//!
//! Options are long flags that can also be set through `INPUT_<NAME>`
//! environment variables, so the tool can run as an action step:
//!
//! ```bash
//! INPUT_AUTHKEY=tskey-auth-... INPUT_VERSION=1.80.0 tsci up
//! ```

mod commands;
mod config;
mod dist;
mod errors;
mod process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{install, resolve, up, version};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the default log filter.
const LOG_ENV: &str = "TSCI_LOG";

/// Connects CI runners to a Tailscale tailnet.
#[derive(Parser)]
#[command(
    name = "tsci",
    author,
    version,
    about = "Connects CI runners to a Tailscale tailnet",
    after_help = "\
ENVIRONMENT VARIABLES:
    INPUT_<NAME>            Value of option --<name> (e.g. INPUT_AUTHKEY)
    RUNNER_OS, RUNNER_ARCH  Runner platform (defaults to the build platform)
    RUNNER_TEMP             Parent of the default work directory
    GITHUB_PATH             File receiving the extracted binaries' directory
    TSCI_PKGS_SERVER        Package server (default: https://pkgs.tailscale.com)
    TSCI_WORK_DIR           Work directory (default: $RUNNER_TEMP/tsci)
    TSCI_LOG                Log filter (default: info)"
)]
pub struct Cli {
    /// Log filter, e.g. "debug" or "tsci=trace". Overrides TSCI_LOG.
    #[clap(long, global = true)]
    pub log_level: Option<String>,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for the tsci CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Install Tailscale, start the daemon and connect to the tailnet.
    ///
    /// Requires either --authkey, or --oauth-client-secret together with
    /// --tags. Fails if `tailscale up` does not succeed within --timeout.
    Up(up::UpArgs),

    /// Download, verify and install Tailscale without connecting.
    Install(install::InstallArgs),

    /// Show the version and artifact that would be installed.
    Resolve(resolve::ResolveArgs),

    /// Display version information.
    Version(version::VersionArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints the error chain and returns the exit code.
fn handle_error(e: &anyhow::Error) -> i32 {
    eprintln!("Error: {e:?}");
    1
}

/// Installs the stderr log subscriber.
fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_env(LOG_ENV).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Commands::Up(args) => up::execute(args).await,
        Commands::Install(args) => install::execute(args).await,
        Commands::Resolve(args) => resolve::execute(args).await,
        Commands::Version(args) => version::execute(&args),
    }
}
