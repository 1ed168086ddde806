//! Install command for the tsci CLI.
//!
//! Downloads, verifies and installs a Tailscale release for the runner's
//! platform without starting or connecting anything. `tsci up` runs the same
//! pipeline before launching the daemon.
//!
//! ## Usage
//!
//! ```bash
//! tsci install                      # latest stable
//! tsci install --version 1.80.0     # exact version
//! tsci install --channel unstable   # latest unstable
//! ```

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::config::{InstallInputs, InstallSettings};
use crate::dist::{
    Installation, Installer, Platform, Release, ReleaseClient, Verification, WorkPaths,
    download_file, verify_artifact,
};
use crate::process::Elevation;

/// Arguments for the install command.
#[derive(Args)]
pub struct InstallArgs {
    #[command(flatten)]
    pub inputs: InstallInputs,
}

/// Everything the install pipeline produced.
#[derive(Debug)]
pub struct Provisioned {
    pub release: Release,
    pub platform: Platform,
    pub installation: Installation,
    pub paths: WorkPaths,
    pub elevation: Elevation,
}

/// Executes the install command.
///
/// # Errors
///
/// Returns an error if validation, resolution, download, verification or
/// installation fails.
pub async fn execute(args: InstallArgs) -> Result<()> {
    let settings = args.inputs.into_install_settings()?;
    let provisioned = provision(&settings).await?;

    let installation = &provisioned.installation;
    println!(
        "Tailscale {} installed for {}.",
        provisioned.release.version, provisioned.platform
    );
    println!("  client: {}", installation.client.display());
    match &installation.daemon {
        Some(daemon) => println!("  daemon: {}", daemon.display()),
        None => println!("  daemon: managed by the system"),
    }
    if let Some(dir) = &installation.bin_dir {
        println!("  path:   {}", dir.display());
    }
    Ok(())
}

/// Resolves, downloads, verifies and installs a release.
///
/// # Process
///
/// 1. Detect the runner platform (fails before any network call)
/// 2. Resolve the version selector against the package server
/// 3. Download the artifact with retries
/// 4. Verify the configured or published SHA256 checksum
/// 5. Install with the platform's strategy
///
/// # Errors
///
/// Returns an error from the first stage that fails.
pub async fn provision(settings: &InstallSettings) -> Result<Provisioned> {
    let platform = Platform::detect(settings.target.portable)?;
    let elevation = Elevation::resolve(settings.sudo);
    let client = ReleaseClient::new(&settings.target.pkgs_server)?;

    println!("Resolving version...");
    let release = client
        .resolve(&settings.target.selector)
        .await
        .context("Failed to resolve the Tailscale version")?;
    info!(version = %release.version, channel = %release.channel, %platform, "resolved release");

    let paths = WorkPaths::new(settings.work_dir.as_deref());
    paths.ensure_directories()?;

    let file_name = platform.artifact_name(&release.version);
    let url = client.artifact_url(release.channel, &file_name);
    let artifact = paths.download_path(&file_name);

    println!("Downloading from {url}...");
    download_file(&url, &artifact).await?;

    println!("Verifying checksum...");
    match verify_artifact(client.http(), &url, &artifact, settings.sha256sum.as_deref()).await? {
        Verification::Verified { sha256 } => info!(%sha256, "checksum verified"),
        Verification::Unverified => {}
    }

    println!("Installing Tailscale {} ({})...", release.version, platform.strategy);
    let installation = Installer::new(platform, &paths, &elevation)
        .install(&artifact, &release.version)
        .await?;

    Ok(Provisioned {
        release,
        platform,
        installation,
        paths,
        elevation,
    })
}
