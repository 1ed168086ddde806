//! Privilege elevation for commands that need root.
//!
//! `tailscaled` needs root to create its TUN device, and `tailscale up`
//! talks to the daemon's root-owned socket. Hosted Linux and macOS runners
//! execute jobs as an unprivileged user with passwordless `sudo`, so those
//! commands are prefixed with `sudo -E` unless the process is already root.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::debug;

/// When to prefix privileged commands with `sudo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SudoMode {
    /// Use sudo when not root and sudo is installed.
    #[default]
    Auto,
    /// Always use sudo (fails if it is not installed).
    Always,
    /// Never use sudo.
    Never,
}

/// Resolved elevation policy for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elevation {
    sudo: Option<PathBuf>,
}

impl Elevation {
    /// Resolves `mode` against the current process.
    #[must_use]
    pub fn resolve(mode: SudoMode) -> Self {
        let elevation = match mode {
            SudoMode::Never => Self::none(),
            SudoMode::Auto if cfg!(windows) || is_root() => Self::none(),
            SudoMode::Always => Self {
                sudo: Some(which::which("sudo").unwrap_or_else(|_| "sudo".into())),
            },
            SudoMode::Auto => Self {
                sudo: which::which("sudo").ok(),
            },
        };
        debug!(?mode, sudo = ?elevation.sudo, "resolved elevation");
        elevation
    }

    /// Elevation that never prefixes commands.
    #[must_use]
    pub fn none() -> Self {
        Self { sudo: None }
    }

    /// Elevation through the given sudo binary.
    #[cfg(test)]
    #[must_use]
    pub fn with_sudo(sudo: impl Into<PathBuf>) -> Self {
        Self {
            sudo: Some(sudo.into()),
        }
    }

    /// Returns the sudo binary in use, if any.
    #[must_use]
    pub fn sudo(&self) -> Option<&Path> {
        self.sudo.as_deref()
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}
