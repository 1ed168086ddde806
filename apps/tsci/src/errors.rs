//! Error types for the tsci CLI.
//!
//! Commands return `anyhow::Result` and attach context at every I/O and
//! network boundary. The failures that callers (and tests) need to tell apart
//! are raised as `TsciError` variants and can be recovered with
//! `anyhow::Error::downcast_ref`.

use std::time::Duration;

use thiserror::Error;

/// Typed failures of a `tsci` run.
///
/// Every variant is fatal: the run is either a complete success or one of
/// these. Non-fatal conditions are logged as warnings and never surface here.
#[derive(Debug, Error)]
pub enum TsciError {
    /// Inputs are missing, contradictory, or malformed.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Which input was wrong and why.
        message: String,
    },

    /// No install procedure exists for this OS/architecture pair.
    #[error("unsupported platform: {os} on {arch}")]
    UnsupportedPlatform {
        /// OS family as reported by the runner.
        os: String,
        /// Raw architecture as reported by the runner.
        arch: String,
    },

    /// The release metadata endpoint did not yield a version.
    #[error("could not resolve version: {message}")]
    Resolution {
        /// Description of the resolution failure.
        message: String,
    },

    /// Network error while fetching an artifact.
    #[error("download error: {message}")]
    Download {
        /// Description of the download failure.
        message: String,
    },

    /// Checksum verification failed.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The expected checksum (normalized).
        expected: String,
        /// The checksum computed over the downloaded file.
        actual: String,
    },

    /// Installing or extracting the artifact failed.
    #[error("installation failed: {message}")]
    Install {
        /// Description of the installation error.
        message: String,
    },

    /// The bring-up command exited with a non-zero code.
    #[error("tailscale up exited with code {code}")]
    BringUpFailed {
        /// The exit code (or -1 when terminated by a signal).
        code: i32,
    },

    /// The bring-up command did not exit before its bound elapsed.
    #[error("tailscale up timed out after {}ms", after.as_millis())]
    BringUpTimedOut {
        /// The bound that elapsed.
        after: Duration,
    },

    /// A peer did not answer `tailscale ping` before the bound elapsed.
    #[error("peer {peer} unreachable after {}ms", after.as_millis())]
    PeerUnreachable {
        /// The peer that was pinged.
        peer: String,
        /// The bound that elapsed.
        after: Duration,
    },
}

impl TsciError {
    /// Creates a new `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedPlatform` error.
    #[must_use]
    pub fn unsupported_platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Creates a new `Resolution` error.
    #[must_use]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Creates a new `Download` error.
    #[must_use]
    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    /// Creates a new `ChecksumMismatch` error.
    #[must_use]
    pub fn checksum_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ChecksumMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Install` error.
    #[must_use]
    pub fn install(message: impl Into<String>) -> Self {
        Self::Install {
            message: message.into(),
        }
    }

    /// Creates a new `BringUpFailed` error.
    #[must_use]
    pub const fn bring_up_failed(code: i32) -> Self {
        Self::BringUpFailed { code }
    }

    /// Creates a new `BringUpTimedOut` error.
    #[must_use]
    pub const fn bring_up_timed_out(after: Duration) -> Self {
        Self::BringUpTimedOut { after }
    }

    /// Creates a new `PeerUnreachable` error.
    #[must_use]
    pub fn peer_unreachable(peer: impl Into<String>, after: Duration) -> Self {
        Self::PeerUnreachable {
            peer: peer.into(),
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_displays_message() {
        let err = TsciError::invalid_config("channel and version are mutually exclusive");
        assert_eq!(
            err.to_string(),
            "invalid configuration: channel and version are mutually exclusive"
        );
    }

    #[test]
    fn unsupported_platform_names_os_and_arch() {
        let err = TsciError::unsupported_platform("FreeBSD", "X64");
        assert_eq!(err.to_string(), "unsupported platform: FreeBSD on X64");
    }

    #[test]
    fn checksum_mismatch_displays_both_values() {
        let err = TsciError::checksum_mismatch("abc123", "def456");
        assert_eq!(
            err.to_string(),
            "checksum mismatch: expected abc123, got def456"
        );
    }

    #[test]
    fn bring_up_failed_displays_code() {
        let err = TsciError::bring_up_failed(3);
        assert_eq!(err.to_string(), "tailscale up exited with code 3");
    }

    #[test]
    fn bring_up_timed_out_displays_millis() {
        let err = TsciError::bring_up_timed_out(Duration::from_secs(1));
        assert_eq!(err.to_string(), "tailscale up timed out after 1000ms");
    }

    #[test]
    fn peer_unreachable_names_peer() {
        let err = TsciError::peer_unreachable("db.internal", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "peer db.internal unreachable after 1500ms");
    }

    #[test]
    fn downcast_recovers_variant_through_anyhow() {
        let err: anyhow::Error = TsciError::resolution("HTTP 503").into();
        let err = err.context("resolving stable track");
        assert!(matches!(
            err.downcast_ref::<TsciError>(),
            Some(TsciError::Resolution { .. })
        ));
    }
}
