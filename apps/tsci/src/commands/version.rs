//! Version command for the tsci CLI.
//!
//! Prints the tool version. In verbose mode also prints the commit it was
//! built from, the build target, and the platform detected from the runner
//! environment.

use anyhow::Result;
use clap::Args;

use crate::dist::Platform;
use crate::dist::platform::{runner_arch, runner_os};

/// Arguments for the version command.
#[derive(Args)]
pub struct VersionArgs {
    /// Also show build and platform details.
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

/// Executes the version command.
#[allow(clippy::unnecessary_wraps)]
pub fn execute(args: &VersionArgs) -> Result<()> {
    println!("tsci {}", env!("CARGO_PKG_VERSION"));
    if args.verbose {
        println!();
        println!("Build Information:");
        println!("  Commit:   {}", option_env!("TSCI_GIT_COMMIT").unwrap_or("unknown"));
        println!("  Target:   {}", option_env!("TSCI_BUILD_TARGET").unwrap_or("unknown"));
        println!("  Runner:   {}", runner_platform());
    }
    Ok(())
}

/// Describes the runner platform, including unsupported ones.
fn runner_platform() -> String {
    match Platform::detect(false) {
        Ok(platform) => format!("{platform} ({})", platform.strategy),
        Err(_) => format!("{} {} (unsupported)", runner_os(), runner_arch()),
    }
}
