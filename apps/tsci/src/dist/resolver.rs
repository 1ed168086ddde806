//! Location of the `tailscale` client and `tailscaled` daemon binaries.
//!
//! The search order for each binary is:
//!
//! 1. Explicit override via `TSCI_TAILSCALE_PATH` / `TSCI_TAILSCALED_PATH`
//! 2. Well-known install locations of the system installer or package
//! 3. System PATH via `which::which`
//!
//! Binaries extracted from an archive are found with [`locate_in`] instead.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use super::platform::{InstallStrategy, OsFamily, Platform};

/// The two binaries a Tailscale release ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binary {
    Client,
    Daemon,
}

impl Binary {
    /// Base file name without extension.
    #[must_use]
    pub fn stem(self) -> &'static str {
        match self {
            Self::Client => "tailscale",
            Self::Daemon => "tailscaled",
        }
    }

    /// Environment variable overriding this binary's location.
    #[must_use]
    pub fn override_env(self) -> &'static str {
        match self {
            Self::Client => "TSCI_TAILSCALE_PATH",
            Self::Daemon => "TSCI_TAILSCALED_PATH",
        }
    }

    /// File name on `platform`.
    #[must_use]
    pub fn file_name(self, platform: &Platform) -> String {
        format!("{}{}", self.stem(), platform.executable_extension())
    }
}

/// Returns `dir/<binary>` when it exists.
#[must_use]
pub fn locate_in(dir: &Path, binary: Binary, platform: &Platform) -> Option<PathBuf> {
    let candidate = dir.join(binary.file_name(platform));
    candidate.is_file().then_some(candidate)
}

/// Known install locations of the system installer and package.
fn system_locations(binary: Binary, platform: &Platform) -> Vec<PathBuf> {
    match (platform.os, platform.strategy) {
        (OsFamily::Windows, InstallStrategy::SystemInstaller) => {
            let program_files = std::env::var_os("ProgramFiles")
                .map_or_else(|| PathBuf::from(r"C:\Program Files"), PathBuf::from);
            vec![
                program_files
                    .join("Tailscale")
                    .join(format!("{}.exe", binary.stem())),
            ]
        }
        (OsFamily::Macos, InstallStrategy::SystemPackage) => match binary {
            Binary::Client => vec![
                PathBuf::from("/usr/local/bin/tailscale"),
                PathBuf::from("/Applications/Tailscale.app/Contents/MacOS/Tailscale"),
            ],
            Binary::Daemon => vec![PathBuf::from("/usr/local/bin/tailscaled")],
        },
        _ => Vec::new(),
    }
}

/// Locates a system-installed `binary` for `platform`.
///
/// # Errors
///
/// Returns an error if the override variable points at a missing file, or if
/// the binary cannot be found anywhere.
pub fn find_binary(binary: Binary, platform: &Platform) -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(binary.override_env()).filter(|s| !s.is_empty()) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
        bail!(
            "{} environment variable set to '{}', but file does not exist",
            binary.override_env(),
            path.display()
        );
    }

    if let Some(path) = system_locations(binary, platform)
        .into_iter()
        .find(|p| p.is_file())
    {
        return Ok(path);
    }

    if let Ok(path) = which::which(binary.stem()) {
        return Ok(path);
    }

    bail!(
        "{name} not found for {platform}.\n\n\
        Looked in the install locations for the {strategy} strategy and on PATH.\n\
        Set {env} to the {name} binary to use a custom installation.",
        name = binary.file_name(platform),
        strategy = platform.strategy,
        env = binary.override_env(),
    );
}
