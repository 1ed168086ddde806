//! Turns a verified artifact into runnable client and daemon binaries.
//!
//! One [`Installer`] handles every platform, with one case per
//! [`InstallStrategy`]:
//!
//! - **System installer** (Windows setup `.exe`): run unattended. The
//!   installer registers and starts the Tailscale service itself.
//! - **System package** (macOS `.pkg`): `installer -pkg ... -target /` with
//!   elevation, then register and start the daemon with `launchctl`.
//! - **Ephemeral archive** (Linux `.tgz`, portable Windows `.zip`): extract to
//!   the work directory, delete the archive, publish the directory on the
//!   job's search path. The daemon is launched later by this tool.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::archive::{extract_archive, set_executable_permissions};
use super::paths::{Publication, WorkPaths, manual_path_hint, publish_search_path};
use super::platform::{InstallStrategy, Platform};
use super::resolver::{Binary, find_binary, locate_in};
use crate::errors::TsciError;
use crate::process::{CommandLine, Elevation};

/// Flag that makes the Windows setup program run without UI.
const SETUP_QUIET_FLAG: &str = "/quiet";

/// launchd label of the daemon installed by the macOS package.
const LAUNCHD_LABEL: &str = "com.tailscale.tailscaled";

/// launchd property list registering the daemon.
const LAUNCHD_PLIST: &str = "/Library/LaunchDaemons/com.tailscale.tailscaled.plist";

/// Where the installed binaries ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    /// Absolute path of the `tailscale` client.
    pub client: PathBuf,
    /// Daemon binary this tool must launch, or `None` when the daemon is an
    /// OS-managed service (or missing from the archive).
    pub daemon: Option<PathBuf>,
    /// Extraction directory, for the ephemeral archive strategy.
    pub bin_dir: Option<PathBuf>,
}

/// Installs artifacts for one platform.
pub struct Installer<'a> {
    platform: Platform,
    paths: &'a WorkPaths,
    elevation: &'a Elevation,
}

impl<'a> Installer<'a> {
    #[must_use]
    pub fn new(platform: Platform, paths: &'a WorkPaths, elevation: &'a Elevation) -> Self {
        Self {
            platform,
            paths,
            elevation,
        }
    }

    /// Installs `artifact` (already verified) for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`TsciError::Install`] if an install tool fails or the client
    /// binary cannot be found afterwards, or an I/O error from extraction.
    pub async fn install(&self, artifact: &Path, version: &str) -> Result<Installation> {
        debug!(strategy = %self.platform.strategy, artifact = %artifact.display(), "installing");
        match self.platform.strategy {
            InstallStrategy::SystemInstaller => self.run_setup(artifact).await,
            InstallStrategy::SystemPackage => self.install_package(artifact).await,
            InstallStrategy::EphemeralArchive => self.extract(artifact, version),
        }
    }

    async fn run_setup(&self, artifact: &Path) -> Result<Installation> {
        println!("Running installer {}...", artifact.display());
        run_step(&setup_command(artifact)).await?;

        let client = find_binary(Binary::Client, &self.platform)
            .map_err(|e| TsciError::install(format!("{e:#}")))?;
        Ok(Installation {
            client,
            daemon: None,
            bin_dir: None,
        })
    }

    async fn install_package(&self, artifact: &Path) -> Result<Installation> {
        println!("Installing package {}...", artifact.display());
        let [install, bootstrap, kickstart] = package_commands(artifact, self.elevation);
        run_step(&install).await?;

        println!("Starting {LAUNCHD_LABEL}...");
        if let Err(e) = run_step(&bootstrap).await {
            // Fails when the package already loaded the service.
            debug!(error = %e, "launchctl bootstrap failed");
        }
        run_step(&kickstart).await?;

        let client = find_binary(Binary::Client, &self.platform)
            .map_err(|e| TsciError::install(format!("{e:#}")))?;
        Ok(Installation {
            client,
            daemon: None,
            bin_dir: None,
        })
    }

    fn extract(&self, artifact: &Path, version: &str) -> Result<Installation> {
        let dir = self.paths.install_dir(version, self.platform.arch);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).with_context(|| {
                format!("Failed to remove previous extraction: {}", dir.display())
            })?;
        }

        println!("Extracting to {}...", dir.display());
        extract_archive(artifact, &dir)?;
        std::fs::remove_file(artifact).ok();

        let client = locate_in(&dir, Binary::Client, &self.platform).ok_or_else(|| {
            TsciError::install(format!(
                "{} missing from {}",
                Binary::Client.file_name(&self.platform),
                artifact.display()
            ))
        })?;
        let daemon = locate_in(&dir, Binary::Daemon, &self.platform);
        if daemon.is_none() {
            warn!(
                dir = %dir.display(),
                "{} not found in archive; it will not be started",
                Binary::Daemon.file_name(&self.platform)
            );
        }

        let mut executables = vec![client.as_path()];
        executables.extend(daemon.as_deref());
        set_executable_permissions(&executables)?;

        publish(&dir);

        Ok(Installation {
            client,
            daemon,
            bin_dir: Some(dir),
        })
    }
}

/// Unattended run of the Windows setup program.
fn setup_command(artifact: &Path) -> CommandLine {
    CommandLine::new(artifact).arg(SETUP_QUIET_FLAG)
}

/// Package install, launchd registration and daemon (re)start, in order.
fn package_commands(artifact: &Path, elevation: &Elevation) -> [CommandLine; 3] {
    [
        CommandLine::new("installer")
            .arg("-pkg")
            .arg(artifact.display().to_string())
            .args(["-target", "/"]),
        CommandLine::new("launchctl").args(["bootstrap", "system", LAUNCHD_PLIST]),
        CommandLine::new("launchctl")
            .args(["kickstart", "-k"])
            .arg(format!("system/{LAUNCHD_LABEL}")),
    ]
    .map(|cmd| cmd.elevated(elevation))
}

/// Makes `dir` reachable for later job steps, or tells the user how to.
fn publish(dir: &Path) {
    match publish_search_path(dir) {
        Ok(Publication::Appended { path_file }) => {
            info!(dir = %dir.display(), path_file = %path_file.display(), "added to job PATH");
        }
        Ok(Publication::AlreadyPresent { path_file }) => {
            debug!(dir = %dir.display(), path_file = %path_file.display(), "already on job PATH");
        }
        Ok(Publication::Unavailable) => {
            println!("To use tailscale in this shell, run:");
            println!("  {}", manual_path_hint(dir));
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "could not publish search path");
            println!("  {}", manual_path_hint(dir));
        }
    }
}

/// Runs an install tool to completion, mapping failure to
/// [`TsciError::Install`].
async fn run_step(cmd: &CommandLine) -> Result<()> {
    info!(command = %cmd, "running");
    let status = cmd
        .to_tokio()
        .status()
        .await
        .map_err(|e| TsciError::install(format!("failed to run {}: {e}", cmd.program.display())))?;

    if !status.success() {
        return Err(TsciError::install(format!(
            "{} exited with {}",
            cmd.program.display(),
            status
                .code()
                .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"))
        ))
        .into());
    }
    Ok(())
}
