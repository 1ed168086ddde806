//! Run configuration.
//!
//! Every option is a long flag that may also be supplied through the
//! environment as `INPUT_<NAME>`, the way CI hosts pass inputs to actions.
//! Empty values count as unset. Raw inputs are validated into typed settings
//! before any network or process side effect happens.
//!
//! The inputs nest by command: [`ReleaseInputs`] is enough for `resolve`,
//! [`InstallInputs`] adds what `install` needs, and [`Inputs`] adds the
//! identity and process options `up` needs.

pub mod duration;
pub mod tokenize;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use tracing::{debug, warn};

use crate::dist::release::{Channel, DEFAULT_PKGS_SERVER, PKGS_SERVER_ENV, VersionSelector};
use crate::errors::TsciError;
use crate::process::daemon::DEFAULT_GRACE;
use crate::process::{StateStore, SudoMode};

pub use duration::{parse_duration, parse_duration_or};
pub use tokenize::tokenize;

/// Sentinel version meaning "latest on the selected track".
const LATEST: &str = "latest";

/// Flag that `up` always receives, unless already supplied.
const ACCEPT_ROUTES: &str = "--accept-routes";

/// Query appended to an OAuth client secret so it can be used as an auth key.
const OAUTH_KEY_PARAMS: &str = "?preauthorized=true&ephemeral=true";

/// Returns the trimmed value when it is non-empty.
fn present(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Splits a comma-separated list, dropping empty items.
fn split_list(value: Option<&String>) -> Vec<String> {
    present(value)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Which release to fetch, and from where.
#[derive(Args, Debug, Clone, Default)]
pub struct ReleaseInputs {
    /// Release track to follow: stable or unstable.
    #[arg(long, env = "INPUT_CHANNEL")]
    pub channel: Option<String>,

    /// Exact version to install, or "latest".
    ///
    /// Defaults to the latest stable release. Cannot be combined with
    /// --channel unless it is "latest".
    #[arg(long, env = "INPUT_VERSION")]
    pub version: Option<String>,

    /// On Windows, use the portable zip instead of the setup installer.
    #[arg(long, env = "INPUT_PORTABLE")]
    pub portable: bool,

    /// Package server to download from.
    #[arg(long, env = PKGS_SERVER_ENV, default_value = DEFAULT_PKGS_SERVER)]
    pub pkgs_server: String,
}

/// Validated release request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub selector: VersionSelector,
    pub portable: bool,
    pub pkgs_server: String,
}

impl ReleaseInputs {
    /// Validates the version selector.
    ///
    /// # Errors
    ///
    /// Returns [`TsciError::InvalidConfig`] for an unknown channel, or for a
    /// channel combined with an explicit version.
    pub fn into_target(self) -> Result<ReleaseTarget, TsciError> {
        let channel = present(self.channel.as_ref())
            .map(|name| {
                Channel::parse(name).ok_or_else(|| {
                    TsciError::invalid_config(format!(
                        "unknown channel '{name}'; expected 'stable' or 'unstable'"
                    ))
                })
            })
            .transpose()?;
        let version = present(self.version.as_ref()).filter(|v| !v.eq_ignore_ascii_case(LATEST));

        let selector = match (channel, version) {
            (Some(_), Some(version)) => {
                return Err(TsciError::invalid_config(format!(
                    "channel and version are mutually exclusive (version '{version}' given with a channel)"
                )));
            }
            (Some(channel), None) => VersionSelector::Track(channel),
            (None, Some(version)) => VersionSelector::Exact(version.to_string()),
            (None, None) => VersionSelector::Latest,
        };

        Ok(ReleaseTarget {
            selector,
            portable: self.portable,
            pkgs_server: self.pkgs_server,
        })
    }
}

/// Options for fetching and installing a release.
#[derive(Args, Debug, Clone, Default)]
pub struct InstallInputs {
    #[command(flatten)]
    pub release: ReleaseInputs,

    /// Expected SHA256 of the artifact. Defaults to the published checksum.
    #[arg(long, env = "INPUT_SHA256SUM")]
    pub sha256sum: Option<String>,

    /// When to run privileged commands through sudo.
    #[arg(long, env = "INPUT_SUDO", value_enum, default_value_t = SudoMode::Auto)]
    pub sudo: SudoMode,

    /// Scratch directory for downloads and extracted binaries.
    #[arg(long, env = "TSCI_WORK_DIR")]
    pub work_dir: Option<PathBuf>,
}

/// Validated install options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSettings {
    pub target: ReleaseTarget,
    pub sha256sum: Option<String>,
    pub sudo: SudoMode,
    pub work_dir: Option<PathBuf>,
}

impl InstallInputs {
    /// Validates install options.
    ///
    /// # Errors
    ///
    /// Returns [`TsciError::InvalidConfig`] if the release request is invalid.
    pub fn into_install_settings(self) -> Result<InstallSettings, TsciError> {
        Ok(InstallSettings {
            sha256sum: present(self.sha256sum.as_ref()).map(String::from),
            work_dir: self.work_dir.filter(|p| !p.as_os_str().is_empty()),
            sudo: self.sudo,
            target: self.release.into_target()?,
        })
    }
}

/// Every option of `tsci up`.
#[derive(Args, Debug, Clone, Default)]
pub struct Inputs {
    #[command(flatten)]
    pub install: InstallInputs,

    /// Auth key for the node.
    #[arg(long, env = "INPUT_AUTHKEY", hide_env_values = true)]
    pub authkey: Option<String>,

    /// OAuth client ID. Informational; the secret alone authenticates.
    #[arg(long, env = "INPUT_OAUTH-CLIENT-ID")]
    pub oauth_client_id: Option<String>,

    /// OAuth client secret. Requires --tags.
    #[arg(long, env = "INPUT_OAUTH-CLIENT-SECRET", hide_env_values = true)]
    pub oauth_client_secret: Option<String>,

    /// Alternate name for --oauth-client-secret.
    #[arg(long, env = "INPUT_OAUTH-SECRET", hide = true, hide_env_values = true)]
    pub oauth_secret: Option<String>,

    /// Comma-separated ACL tags to advertise, e.g. "tag:ci".
    #[arg(long, env = "INPUT_TAGS")]
    pub tags: Option<String>,

    /// Extra flags for `tailscale up`.
    #[arg(long, env = "INPUT_ARGS", allow_hyphen_values = true)]
    pub args: Option<String>,

    /// Extra flags for `tailscaled`.
    #[arg(long, env = "INPUT_TAILSCALED-ARGS", allow_hyphen_values = true)]
    pub tailscaled_args: Option<String>,

    /// Node name. Defaults to "github-<runner hostname>".
    #[arg(long, env = "INPUT_HOSTNAME")]
    pub hostname: Option<String>,

    /// Daemon state directory. Defaults to in-memory state.
    #[arg(long, env = "INPUT_STATEDIR")]
    pub statedir: Option<PathBuf>,

    /// Bound on `tailscale up`, e.g. "90s" or "5m".
    #[arg(long, env = "INPUT_TIMEOUT", default_value = "2m")]
    pub timeout: String,

    /// Comma-separated peers that must answer `tailscale ping` before success.
    #[arg(long, env = "INPUT_PING")]
    pub ping: Option<String>,

    /// Delay between starting the daemon and using it.
    #[arg(long, env = "TSCI_DAEMON_GRACE", default_value = "3s", hide = true)]
    pub daemon_grace: String,
}

/// How the node authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Identity {
    /// A pre-issued auth key.
    AuthKey(String),
    /// An OAuth client secret used directly as an auth key for tagged nodes.
    OAuth {
        secret: String,
        client_id: Option<String>,
    },
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthKey(_) => f.write_str("AuthKey(***)"),
            Self::OAuth { client_id, .. } => f
                .debug_struct("OAuth")
                .field("secret", &"***")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

impl Identity {
    /// Returns the `--authkey` flag for this identity.
    #[must_use]
    pub fn authkey_flag(&self) -> String {
        match self {
            Self::AuthKey(key) => format!("--authkey={key}"),
            Self::OAuth { secret, .. } => format!("--authkey={secret}{OAUTH_KEY_PARAMS}"),
        }
    }
}

/// Validated settings for `tsci up`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub install: InstallSettings,
    pub identity: Identity,
    pub tags: Vec<String>,
    pub hostname: String,
    pub up_args: Vec<String>,
    pub daemon_args: Vec<String>,
    pub state: StateStore,
    pub timeout: Duration,
    pub ping: Vec<String>,
    pub daemon_grace: Duration,
}

impl Settings {
    /// Builds the argument list for `tailscale up`.
    #[must_use]
    pub fn up_flags(&self) -> Vec<String> {
        let mut flags = vec![self.identity.authkey_flag()];
        if !self.tags.is_empty() {
            flags.push(format!("--advertise-tags={}", self.tags.join(",")));
        }
        flags.push(format!("--hostname={}", self.hostname));
        if !self
            .up_args
            .iter()
            .any(|a| a == ACCEPT_ROUTES || a.starts_with("--accept-routes="))
        {
            flags.push(ACCEPT_ROUTES.to_string());
        }
        flags.extend(self.up_args.iter().cloned());
        flags
    }
}

impl Inputs {
    /// Validates every option.
    ///
    /// # Errors
    ///
    /// Returns [`TsciError::InvalidConfig`] when the identity or release
    /// options are missing, conflicting, or malformed.
    pub fn into_settings(self) -> Result<Settings, TsciError> {
        let identity = self.identity()?;
        let tags = split_list(self.tags.as_ref());
        if matches!(identity, Identity::OAuth { .. }) && tags.is_empty() {
            return Err(TsciError::invalid_config(
                "tags are required when using an OAuth client secret",
            ));
        }

        let hostname = present(self.hostname.as_ref()).map_or_else(default_hostname, String::from);
        let state = self
            .statedir
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or(StateStore::Memory, StateStore::Directory);

        let settings = Settings {
            identity,
            tags,
            hostname,
            up_args: present(self.args.as_ref()).map(tokenize).unwrap_or_default(),
            daemon_args: present(self.tailscaled_args.as_ref())
                .map(tokenize)
                .unwrap_or_default(),
            state,
            timeout: parse_duration(&self.timeout),
            ping: split_list(self.ping.as_ref()),
            daemon_grace: parse_duration_or(&self.daemon_grace, DEFAULT_GRACE),
            install: self.install.into_install_settings()?,
        };
        debug!(?settings, "validated settings");
        Ok(settings)
    }

    fn identity(&self) -> Result<Identity, TsciError> {
        let authkey = present(self.authkey.as_ref());
        let secret = present(self.oauth_client_secret.as_ref())
            .or_else(|| present(self.oauth_secret.as_ref()));
        let client_id = present(self.oauth_client_id.as_ref());

        match (authkey, secret) {
            (Some(_), Some(_)) => Err(TsciError::invalid_config(
                "authkey and oauth-client-secret are mutually exclusive",
            )),
            (Some(_), None) if client_id.is_some() => Err(TsciError::invalid_config(
                "oauth-client-id requires oauth-client-secret",
            )),
            (Some(key), None) => Ok(Identity::AuthKey(key.to_string())),
            (None, Some(secret)) => Ok(Identity::OAuth {
                secret: secret.to_string(),
                client_id: client_id.map(String::from),
            }),
            (None, None) => Err(TsciError::invalid_config(
                "either authkey or oauth-client-secret with tags must be set",
            )),
        }
    }
}

/// Returns `github-<runner hostname>`.
fn default_hostname() -> String {
    match hostname::get() {
        Ok(name) => format!("github-{}", name.to_string_lossy()),
        Err(e) => {
            warn!(error = %e, "could not read the machine hostname");
            "github-runner".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        inputs: Inputs,
    }

    fn parse(args: &[&str]) -> Result<Settings, TsciError> {
        let mut argv = vec!["tsci"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv)
            .expect("arguments should parse")
            .inputs
            .into_settings()
    }

    fn assert_invalid(result: Result<Settings, TsciError>, needle: &str) {
        match result {
            Err(TsciError::InvalidConfig { message }) => {
                assert!(message.contains(needle), "unexpected message: {message}");
            }
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn authkey_defaults() {
        let settings = parse(&["--authkey", "tskey-abc", "--hostname", "ci-1"]).expect("valid");
        assert_eq!(settings.identity, Identity::AuthKey("tskey-abc".into()));
        assert_eq!(settings.install.target.selector, VersionSelector::Latest);
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert_eq!(settings.state, StateStore::Memory);
        assert_eq!(settings.daemon_grace, DEFAULT_GRACE);
        assert_eq!(
            settings.up_flags(),
            vec!["--authkey=tskey-abc", "--hostname=ci-1", "--accept-routes"]
        );
    }

    #[test]
    fn oauth_secret_with_tags_is_accepted() {
        let settings = parse(&[
            "--authkey",
            "",
            "--oauth-client-secret",
            "tskey-client-xyz",
            "--tags",
            "tag:ci, tag:build,",
            "--hostname",
            "ci-2",
        ])
        .expect("valid");
        assert_eq!(
            settings.up_flags(),
            vec![
                "--authkey=tskey-client-xyz?preauthorized=true&ephemeral=true",
                "--advertise-tags=tag:ci,tag:build",
                "--hostname=ci-2",
                "--accept-routes",
            ]
        );
    }

    #[test]
    fn oauth_secret_alias_is_accepted() {
        let settings =
            parse(&["--oauth-secret", "s3cret", "--tags", "tag:ci", "--hostname", "h"]).expect("valid");
        assert!(matches!(settings.identity, Identity::OAuth { .. }));
    }

    #[test]
    fn missing_identity_is_rejected() {
        assert_invalid(parse(&[]), "either authkey");
        assert_invalid(parse(&["--authkey", "  ", "--tags", ""]), "either authkey");
    }

    #[test]
    fn oauth_without_tags_is_rejected() {
        assert_invalid(parse(&["--oauth-client-secret", "s3cret"]), "tags are required");
    }

    #[test]
    fn both_identities_are_rejected() {
        assert_invalid(
            parse(&["--authkey", "k", "--oauth-client-secret", "s", "--tags", "tag:ci"]),
            "mutually exclusive",
        );
    }

    #[test]
    fn client_id_without_secret_is_rejected() {
        assert_invalid(
            parse(&["--authkey", "k", "--oauth-client-id", "id"]),
            "oauth-client-id requires",
        );
    }

    #[test]
    fn channel_and_version_are_exclusive() {
        assert_invalid(
            parse(&["--authkey", "k", "--channel", "stable", "--version", "1.2.3"]),
            "mutually exclusive",
        );
    }

    #[test]
    fn channel_with_latest_is_allowed() {
        let settings =
            parse(&["--authkey", "k", "--channel", "unstable", "--version", "latest"]).expect("valid");
        assert_eq!(
            settings.install.target.selector,
            VersionSelector::Track(Channel::Unstable)
        );
    }

    #[test]
    fn explicit_version_is_exact() {
        let settings = parse(&["--authkey", "k", "--version", "1.80.0"]).expect("valid");
        assert_eq!(
            settings.install.target.selector,
            VersionSelector::Exact("1.80.0".into())
        );
    }

    #[test]
    fn unknown_channel_is_rejected() {
        assert_invalid(parse(&["--authkey", "k", "--channel", "beta"]), "unknown channel");
    }

    #[test]
    fn args_are_tokenized_and_accept_routes_not_duplicated() {
        let settings = parse(&[
            "--authkey",
            "k",
            "--hostname",
            "h",
            "--args",
            "--accept-routes --advertise-routes=\"10.0.0.0/8 192.168.0.0/16\"",
            "--tailscaled-args",
            "--port=41641 --verbose=1",
        ])
        .expect("valid");
        assert_eq!(
            settings.up_flags(),
            vec![
                "--authkey=k",
                "--hostname=h",
                "--accept-routes",
                "--advertise-routes=10.0.0.0/8 192.168.0.0/16",
            ]
        );
        assert_eq!(settings.daemon_args, vec!["--port=41641", "--verbose=1"]);
    }

    #[test]
    fn statedir_timeout_and_ping() {
        let settings = parse(&[
            "--authkey",
            "k",
            "--statedir",
            "/var/lib/tailscale",
            "--timeout",
            "45s",
            "--ping",
            "db.internal, 100.64.0.1",
        ])
        .expect("valid");
        assert_eq!(
            settings.state,
            StateStore::Directory(PathBuf::from("/var/lib/tailscale"))
        );
        assert_eq!(settings.timeout, Duration::from_secs(45));
        assert_eq!(settings.ping, vec!["db.internal", "100.64.0.1"]);
    }

    #[test]
    fn malformed_timeout_falls_back_to_two_minutes() {
        let settings = parse(&["--authkey", "k", "--timeout", "soon"]).expect("valid");
        assert_eq!(settings.timeout, Duration::from_millis(duration::DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn default_hostname_is_prefixed() {
        let settings = parse(&["--authkey", "k"]).expect("valid");
        assert!(settings.hostname.starts_with("github-"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let settings = parse(&["--authkey", "tskey-very-secret"]).expect("valid");
        assert!(!format!("{settings:?}").contains("tskey-very-secret"));
    }
}
