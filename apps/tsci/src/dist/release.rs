//! Release track resolution against the Tailscale package server.
//!
//! Each release track publishes a small JSON document describing its latest
//! build at `<server>/<track>/?mode=json`:
//!
//! ```json
//! { "Version": "1.80.0", "TarballsVersion": "1.80.0", ... }
//! ```
//!
//! Only `Version` is read. The server can be overridden with the
//! `TSCI_PKGS_SERVER` environment variable (or `--pkgs-server`) to use a
//! mirror or a mock server in tests.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::TsciError;

/// Environment variable to override the package server URL.
pub const PKGS_SERVER_ENV: &str = "TSCI_PKGS_SERVER";

/// Default package server URL.
pub const DEFAULT_PKGS_SERVER: &str = "https://pkgs.tailscale.com";

/// Request timeout for metadata and checksum requests, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User-Agent header for HTTP requests.
pub(crate) const USER_AGENT: &str = concat!("tsci/", env!("CARGO_PKG_VERSION"));

/// A named release track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stable,
    Unstable,
}

impl Channel {
    /// Parses a track name; `None` for anything other than `stable`/`unstable`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stable" => Some(Self::Stable),
            "unstable" => Some(Self::Unstable),
            _ => None,
        }
    }

    /// Returns the track's path segment on the package server.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Unstable => "unstable",
        }
    }

    /// Returns the track an explicit version is published on.
    ///
    /// Odd minor versions (`1.79.x`) are unstable builds, even minors are
    /// stable. Versions that are not valid semver are assumed stable.
    ///
    /// The package server only publishes odd minors under `/unstable`, so an
    /// explicit version picks its track from the number instead of defaulting
    /// to stable.
    #[must_use]
    pub fn for_version(version: &str) -> Self {
        match semver::Version::parse(version.trim().trim_start_matches('v')) {
            Ok(v) if v.minor % 2 == 1 => Self::Unstable,
            _ => Self::Stable,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for. Channel and explicit version are mutually
/// exclusive by construction; see `config::Inputs::into_settings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// Latest build on a named track.
    Track(Channel),
    /// Latest stable build (no channel, version unset or `latest`).
    Latest,
    /// A specific version string, used verbatim.
    Exact(String),
}

/// A concrete version and the track to download it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    pub version: String,
    pub channel: Channel,
}

/// Per-track metadata document.
#[derive(Debug, Deserialize)]
struct TrackMetadata {
    #[serde(rename = "Version")]
    version: Option<String>,
}

/// Client for the package server.
#[derive(Debug, Clone)]
pub struct ReleaseClient {
    server: String,
    http: reqwest::Client,
}

impl ReleaseClient {
    /// Creates a client for `server`. Trailing slashes are ignored; an empty
    /// value selects [`DEFAULT_PKGS_SERVER`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(server: &str) -> Result<Self> {
        let server = server.trim().trim_end_matches('/');
        let server = if server.is_empty() {
            DEFAULT_PKGS_SERVER
        } else {
            server
        };

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            server: server.to_string(),
            http,
        })
    }

    /// Returns the shared HTTP client used for small requests.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns the metadata URL for a track.
    #[must_use]
    pub fn metadata_url(&self, channel: Channel) -> String {
        format!("{}/{channel}/?mode=json", self.server)
    }

    /// Returns the download URL of an artifact on a track.
    #[must_use]
    pub fn artifact_url(&self, channel: Channel, file_name: &str) -> String {
        format!("{}/{channel}/{file_name}", self.server)
    }

    /// Fetches the latest version published on a track.
    ///
    /// Single attempt: any status other than 200, an unreadable body, or a
    /// missing `Version` field is a [`TsciError::Resolution`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is unusable.
    pub async fn latest(&self, channel: Channel) -> Result<String> {
        let url = self.metadata_url(channel);
        debug!(%url, "fetching track metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TsciError::resolution(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TsciError::resolution(format!("HTTP {status} from {url}")).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| TsciError::resolution(format!("failed to read {url}: {e}")))?;

        let metadata: TrackMetadata = serde_json::from_str(&body)
            .map_err(|e| TsciError::resolution(format!("invalid metadata from {url}: {e}")))?;

        metadata
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TsciError::resolution(format!("no Version field in {url}")).into())
    }

    /// Resolves a selector to a concrete release.
    ///
    /// # Errors
    ///
    /// Returns an error if a metadata lookup is needed and fails.
    pub async fn resolve(&self, selector: &VersionSelector) -> Result<Release> {
        match selector {
            VersionSelector::Track(channel) => Ok(Release {
                version: self.latest(*channel).await?,
                channel: *channel,
            }),
            VersionSelector::Latest => Ok(Release {
                version: self.latest(Channel::Stable).await?,
                channel: Channel::Stable,
            }),
            VersionSelector::Exact(version) => Ok(Release {
                version: version.clone(),
                channel: Channel::for_version(version),
            }),
        }
    }
}
