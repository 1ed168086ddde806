//! Foreground commands raced against a timeout.
//!
//! The child inherits the caller's standard streams so its output appears
//! in the job log as it is produced. Whichever of child exit and timer fires
//! first decides the [`Outcome`]; the other is dropped, so each run resolves
//! exactly once.
//!
//! On Unix the child leads its own process group, and a timeout signals the
//! whole group. Descendants holding the inherited streams would otherwise
//! keep the job's output open after the child is gone.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Child;
use tracing::{debug, warn};

use super::CommandLine;

/// How long a terminated child gets to exit before it is killed outright.
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Terminal state of a bounded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exited with code 0.
    Succeeded,
    /// Exited with a non-zero code (`-1` when killed by a signal).
    Failed { code: i32 },
    /// Still running when the bound elapsed; it has been terminated.
    TimedOut { after: Duration },
}

/// Runs `cmd` to completion or until `bound` elapses, whichever is first.
///
/// # Errors
///
/// Returns an error if the command cannot be spawned or waited on. Non-zero
/// exits and timeouts are reported through [`Outcome`], not as errors.
pub async fn run_bounded(cmd: &CommandLine, bound: Duration) -> Result<Outcome> {
    debug!(command = %cmd, bound_ms = bound.as_millis(), "spawning bounded command");

    let mut command = cmd.to_tokio();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to start {}", cmd.program.display()))?;

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = tokio::time::sleep(bound) => None,
    };

    match exited {
        Some(status) => {
            let status =
                status.with_context(|| format!("Failed to wait for {}", cmd.program.display()))?;
            Ok(if status.success() {
                Outcome::Succeeded
            } else {
                Outcome::Failed {
                    code: status.code().unwrap_or(-1),
                }
            })
        }
        None => {
            warn!(command = %cmd, "timed out after {}ms, terminating", bound.as_millis());
            terminate(&mut child).await;
            Ok(Outcome::TimedOut { after: bound })
        }
    }
}

/// Asks the child's process group to stop, then kills whatever is left and
/// reaps the child.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pgid) = child.id().and_then(|id| i32::try_from(id).ok()) {
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            let group = Pid::from_raw(pgid);
            match killpg(group, Signal::SIGTERM) {
                Ok(()) => {
                    if let Ok(status) = tokio::time::timeout(KILL_GRACE, child.wait()).await {
                        debug!(?status, "terminated child exited");
                        // Stragglers that ignored SIGTERM.
                        killpg(group, Signal::SIGKILL).ok();
                        return;
                    }
                    debug!(pgid, "child ignored SIGTERM, killing its group");
                }
                Err(e) => debug!(pgid, error = %e, "SIGTERM failed"),
            }
            if let Err(e) = killpg(group, Signal::SIGKILL) {
                debug!(pgid, error = %e, "SIGKILL failed");
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "kill failed; child may have already exited");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn zero_exit_succeeds() {
        let outcome = run_bounded(&sh("exit 0"), Duration::from_secs(10))
            .await
            .expect("run");
        assert_eq!(outcome, Outcome::Succeeded);
    }

    #[tokio::test]
    async fn non_zero_exit_carries_code() {
        let outcome = run_bounded(&sh("exit 3"), Duration::from_secs(10))
            .await
            .expect("run");
        assert_eq!(outcome, Outcome::Failed { code: 3 });
    }

    #[tokio::test]
    async fn hung_command_times_out() {
        let bound = Duration::from_millis(300);
        let started = Instant::now();
        let outcome = run_bounded(&sh("sleep 30"), bound).await.expect("run");
        assert_eq!(outcome, Outcome::TimedOut { after: bound });
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn sigterm_ignoring_command_is_killed() {
        let bound = Duration::from_millis(200);
        let started = Instant::now();
        let outcome = run_bounded(&sh("trap '' TERM; sleep 30"), bound)
            .await
            .expect("run");
        assert_eq!(outcome, Outcome::TimedOut { after: bound });
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    /// True while `pid` exists and is not a zombie awaiting its reaper.
    fn is_running(pid: i32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), None).is_err() {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|state| state.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn timeout_stops_background_descendants() {
        let dir = std::env::temp_dir().join(format!("tsci_test_bounded_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        let pid_file = dir.join("pid");

        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let bound = Duration::from_millis(500);
        let outcome = run_bounded(&sh(&script), bound).await.expect("run");
        assert_eq!(outcome, Outcome::TimedOut { after: bound });

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .expect("read pid")
            .trim()
            .parse()
            .expect("pid");
        let deadline = Instant::now() + Duration::from_secs(5);
        while is_running(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!is_running(pid), "background sleep {pid} survived the timeout");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let cmd = CommandLine::new("/nonexistent/tailscale").arg("up");
        assert!(run_bounded(&cmd, Duration::from_secs(1)).await.is_err());
    }
}
