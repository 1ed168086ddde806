//! Detached `tailscaled` launch.
//!
//! The daemon is started in its own process group with no inherited stdio
//! and its `Child` handle is dropped without waiting: ownership passes to the
//! runner, which tears the job's processes down when the job ends. Output is
//! appended to a log file in the work directory.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::bounded::{Outcome, run_bounded};
use super::{CommandLine, Elevation};

/// Default delay between launching the daemon and using it.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(3);

/// Bound on the post-launch `tailscale status` probe.
const PROBE_BOUND: Duration = Duration::from_secs(15);

/// Where the daemon keeps its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateStore {
    /// In-memory state, discarded when the daemon exits.
    Memory,
    /// On-disk state directory, created if missing.
    Directory(PathBuf),
}

impl StateStore {
    /// Returns the `tailscaled` flag selecting this store.
    #[must_use]
    pub fn flag(&self) -> String {
        match self {
            Self::Memory => "--state=mem:".to_string(),
            Self::Directory(dir) => format!("--statedir={}", dir.display()),
        }
    }
}

/// A daemon whose lifetime now belongs to the job environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedDaemon {
    pub pid: u32,
    pub log_file: PathBuf,
}

/// Starts `daemon` detached with `state` and `extra_args`.
///
/// # Errors
///
/// Returns an error if the state directory or log file cannot be created, or
/// the process cannot be spawned.
pub fn launch_daemon(
    daemon: &Path,
    state: &StateStore,
    extra_args: &[String],
    elevation: &Elevation,
    log_file: &Path,
) -> Result<LaunchedDaemon> {
    if let StateStore::Directory(dir) = state {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
    }

    let cmd = CommandLine::new(daemon)
        .arg(state.flag())
        .args(extra_args.iter().cloned())
        .elevated(elevation);
    info!(command = %cmd, "launching daemon");

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open daemon log: {}", log_file.display()))?;
    let log_err = log
        .try_clone()
        .with_context(|| format!("Failed to open daemon log: {}", log_file.display()))?;

    let mut command = cmd.to_std();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    detach(&mut command);

    let child = command
        .spawn()
        .with_context(|| format!("Failed to start daemon: {}", daemon.display()))?;
    let pid = child.id();
    drop(child);

    debug!(pid, log = %log_file.display(), "daemon detached");
    Ok(LaunchedDaemon {
        pid,
        log_file: log_file.to_path_buf(),
    })
}

#[cfg(unix)]
fn detach(command: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut std::process::Command) {}

/// Runs `tailscale status` once as a best-effort readiness probe.
///
/// Returns whether the probe succeeded. Failure is logged, never fatal: the
/// daemon may still be starting, and `status` also fails while logged out.
pub async fn probe_status(client: &Path, elevation: &Elevation) -> bool {
    let cmd = CommandLine::new(client).arg("status").elevated(elevation);
    match run_bounded(&cmd, PROBE_BOUND).await {
        Ok(Outcome::Succeeded) => true,
        Ok(outcome) => {
            warn!(?outcome, "tailscale status failed; the daemon may still be starting");
            false
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "could not run tailscale status");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_test_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("tsci_test_{}_{}", name, rand::random::<u64>()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        dir
    }

    #[test]
    fn state_flags() {
        assert_eq!(StateStore::Memory.flag(), "--state=mem:");
        assert_eq!(
            StateStore::Directory(PathBuf::from("state")).flag(),
            "--statedir=state"
        );
    }

    #[cfg(unix)]
    #[test]
    fn launched_daemon_outlives_handle() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_test_dir("daemon_launch");
        let script = dir.join("tailscaled");
        std::fs::write(&script, "#!/bin/sh\necho \"started $*\"\n").expect("write");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        let state_dir = dir.join("state");
        let log = dir.join("tailscaled.log");

        let launched = launch_daemon(
            &script,
            &StateStore::Directory(state_dir.clone()),
            &["--port=41641".to_string()],
            &Elevation::none(),
            &log,
        )
        .expect("launch");

        assert!(launched.pid > 0);
        assert!(state_dir.is_dir(), "state directory should be created");

        let expected = format!("started --statedir={} --port=41641", state_dir.display());
        let mut content = String::new();
        for _ in 0..50 {
            content = std::fs::read_to_string(&log).unwrap_or_default();
            if content.contains(&expected) {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(content.contains(&expected), "log was: {content}");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_daemon_fails_to_launch() {
        let dir = temp_test_dir("daemon_missing");
        let result = launch_daemon(
            &dir.join("tailscaled"),
            &StateStore::Memory,
            &[],
            &Elevation::none(),
            &dir.join("tailscaled.log"),
        );
        assert!(result.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_probe_is_not_fatal() {
        assert!(!probe_status(Path::new("/nonexistent/tailscale"), &Elevation::none()).await);
    }
}
