//! Platform resolution for Tailscale artifacts.
//!
//! Maps the runner's OS family and raw architecture onto the file naming
//! convention used by the package server and onto the procedure that turns
//! the downloaded file into a working client/daemon pair.
//!
//! ## Supported Platforms
//!
//! | OS      | artifact                          | strategy          |
//! |---------|-----------------------------------|-------------------|
//! | Linux   | `tailscale_<V>_<A>.tgz`           | ephemeral archive |
//! | Windows | `tailscale-setup-<V>.exe`         | system installer  |
//! | Windows | `tailscale_<V>_<A>.zip` (portable)| ephemeral archive |
//! | macOS   | `Tailscale-<V>-macos.pkg`         | system package    |

use std::fmt;

use anyhow::Result;

use crate::errors::TsciError;

/// Environment variable carrying the runner's OS family (`Linux`, `Windows`, `macOS`).
pub const RUNNER_OS_ENV: &str = "RUNNER_OS";

/// Environment variable carrying the runner's architecture (`X64`, `ARM64`, `ARM`, `X86`).
pub const RUNNER_ARCH_ENV: &str = "RUNNER_ARCH";

/// Operating system families with a known install procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    Windows,
    Macos,
}

impl OsFamily {
    /// Parses an OS family name as reported by CI runners or by Rust's
    /// `std::env::consts::OS`. Returns `None` for anything unsupported.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            "macos" | "darwin" | "osx" => Some(Self::Macos),
            _ => None,
        }
    }

    /// Returns the lowercase OS name used in artifact file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Macos => "macos",
        }
    }
}

/// How a downloaded artifact becomes a runnable client and daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStrategy {
    /// Run a native setup program unattended; the daemon becomes an OS service.
    SystemInstaller,
    /// Install a system package with elevation, then register and start the daemon.
    SystemPackage,
    /// Extract an archive into a scratch directory and run binaries from there.
    EphemeralArchive,
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SystemInstaller => "system installer",
            Self::SystemPackage => "system package",
            Self::EphemeralArchive => "ephemeral archive",
        };
        f.write_str(name)
    }
}

/// File format of the downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Tgz,
    Zip,
    SetupExe,
    Pkg,
}

impl ArtifactKind {
    /// Returns the file extension, without the leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Tgz => "tgz",
            Self::Zip => "zip",
            Self::SetupExe => "exe",
            Self::Pkg => "pkg",
        }
    }
}

/// Maps a raw architecture name onto the package server's naming.
///
/// `ARM64 -> arm64`, `ARM -> arm`, `X86 -> 386`; everything else is `amd64`.
#[must_use]
pub fn map_arch(raw: &str) -> &'static str {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ARM64" => "arm64",
        "ARM" => "arm",
        "X86" => "386",
        _ => "amd64",
    }
}

/// Returns the runner's architecture, preferring `RUNNER_ARCH` and falling
/// back to the architecture this binary was compiled for.
#[must_use]
pub fn runner_arch() -> String {
    std::env::var(RUNNER_ARCH_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| {
            match std::env::consts::ARCH {
                "aarch64" => "ARM64",
                "arm" => "ARM",
                "x86" => "X86",
                _ => "X64",
            }
            .to_string()
        })
}

/// Returns the runner's OS family name, preferring `RUNNER_OS`.
#[must_use]
pub fn runner_os() -> String {
    std::env::var(RUNNER_OS_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}

/// A resolved platform: OS, mapped architecture, artifact format, and
/// install procedure. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: &'static str,
    pub kind: ArtifactKind,
    pub strategy: InstallStrategy,
}

impl Platform {
    /// Resolves a platform from an OS family name and raw architecture.
    ///
    /// `portable` selects the zip archive over the setup installer on Windows
    /// and has no effect elsewhere. Returns `None` when the OS is unsupported;
    /// callers must treat that as fatal.
    #[must_use]
    pub fn resolve(os: &str, raw_arch: &str, portable: bool) -> Option<Self> {
        let os = OsFamily::parse(os)?;
        let arch = map_arch(raw_arch);
        let (kind, strategy) = match os {
            OsFamily::Linux => (ArtifactKind::Tgz, InstallStrategy::EphemeralArchive),
            OsFamily::Windows if portable => (ArtifactKind::Zip, InstallStrategy::EphemeralArchive),
            OsFamily::Windows => (ArtifactKind::SetupExe, InstallStrategy::SystemInstaller),
            OsFamily::Macos => (ArtifactKind::Pkg, InstallStrategy::SystemPackage),
        };
        Some(Self {
            os,
            arch,
            kind,
            strategy,
        })
    }

    /// Resolves the platform of the current runner.
    ///
    /// # Errors
    ///
    /// Returns [`TsciError::UnsupportedPlatform`] if the OS family has no
    /// install procedure.
    pub fn detect(portable: bool) -> Result<Self> {
        let os = runner_os();
        let arch = runner_arch();
        Self::resolve(&os, &arch, portable)
            .ok_or_else(|| TsciError::unsupported_platform(os, arch).into())
    }

    /// Returns the artifact file name for `version`.
    #[must_use]
    pub fn artifact_name(&self, version: &str) -> String {
        match self.kind {
            ArtifactKind::Tgz | ArtifactKind::Zip => {
                format!("tailscale_{version}_{}.{}", self.arch, self.kind.extension())
            }
            ArtifactKind::SetupExe => format!("tailscale-setup-{version}.exe"),
            ArtifactKind::Pkg => format!("Tailscale-{version}-{}.pkg", self.os.as_str()),
        }
    }

    /// Returns the executable suffix for binaries shipped inside the archive.
    ///
    /// Only the portable Windows archive carries `.exe` binaries that this
    /// tool launches directly.
    #[must_use]
    pub fn executable_extension(&self) -> &'static str {
        match (self.os, self.strategy) {
            (OsFamily::Windows, InstallStrategy::EphemeralArchive) => ".exe",
            _ => "",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch)
    }
}
