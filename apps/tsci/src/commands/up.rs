//! Up command for the tsci CLI.
//!
//! Installs Tailscale, starts `tailscaled`, and connects the runner to the
//! tailnet with `tailscale up`, bounded by `--timeout`. With `--ping`, also
//! waits until each listed peer answers.
//!
//! ## Usage
//!
//! ```bash
//! tsci up --authkey tskey-auth-...
//! tsci up --oauth-client-secret tskey-client-... --tags tag:ci
//! INPUT_AUTHKEY=tskey-auth-... INPUT_TIMEOUT=5m tsci up
//! ```

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use tracing::{debug, info};

use super::install::provision;
use crate::config::{Identity, Inputs, Settings};
use crate::errors::TsciError;
use crate::process::{
    CommandLine, Elevation, Outcome, launch_daemon, probe_status, run_bounded,
};

/// File in the work directory receiving the daemon's output.
const DAEMON_LOG: &str = "tailscaled.log";

/// Pause between unanswered pings.
const PING_INTERVAL: Duration = Duration::from_secs(1);

/// Arguments for the up command.
#[derive(Args)]
pub struct UpArgs {
    #[command(flatten)]
    pub inputs: Inputs,
}

/// Executes the up command.
///
/// # Errors
///
/// Returns an error if any pipeline stage fails, if `tailscale up` exits
/// non-zero or times out, or if a `--ping` peer stays unreachable.
pub async fn execute(args: UpArgs) -> Result<()> {
    let settings = args.inputs.into_settings()?;
    if let Identity::OAuth {
        client_id: Some(client_id),
        ..
    } = &settings.identity
    {
        info!(%client_id, "authenticating with OAuth client");
    }

    let provisioned = provision(&settings.install).await?;
    let client = &provisioned.installation.client;
    let elevation = &provisioned.elevation;

    if let Some(daemon) = &provisioned.installation.daemon {
        println!("Starting tailscaled...");
        let launched = launch_daemon(
            daemon,
            &settings.state,
            &settings.daemon_args,
            elevation,
            &provisioned.paths.root.join(DAEMON_LOG),
        )?;
        info!(pid = launched.pid, log = %launched.log_file.display(), "tailscaled started");
    }

    debug!(grace_ms = settings.daemon_grace.as_millis(), "waiting for daemon");
    tokio::time::sleep(settings.daemon_grace).await;
    probe_status(client, elevation).await;

    println!("Connecting to tailnet as {}...", settings.hostname);
    bring_up(&settings, client, elevation).await?;

    for peer in &settings.ping {
        println!("Waiting for {peer}...");
        wait_for_peer(client, elevation, peer, settings.timeout).await?;
    }

    println!("Connected to tailnet as {}.", settings.hostname);
    Ok(())
}

/// Runs `tailscale up` under the configured timeout.
async fn bring_up(settings: &Settings, client: &Path, elevation: &Elevation) -> Result<()> {
    let cmd = CommandLine::new(client)
        .arg("up")
        .args(settings.up_flags())
        .elevated(elevation);
    info!(command = %cmd, "bringing tailscale up");

    match run_bounded(&cmd, settings.timeout).await? {
        Outcome::Succeeded => Ok(()),
        Outcome::Failed { code } => Err(TsciError::bring_up_failed(code).into()),
        Outcome::TimedOut { after } => Err(TsciError::bring_up_timed_out(after).into()),
    }
}

/// Pings `peer` until it answers or `bound` elapses.
async fn wait_for_peer(
    client: &Path,
    elevation: &Elevation,
    peer: &str,
    bound: Duration,
) -> Result<()> {
    let cmd = CommandLine::new(client)
        .args(["ping", "-c", "1", peer])
        .elevated(elevation);
    let deadline = Instant::now() + bound;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TsciError::peer_unreachable(peer, bound).into());
        }
        match run_bounded(&cmd, remaining).await? {
            Outcome::Succeeded => {
                info!(%peer, "peer reachable");
                return Ok(());
            }
            outcome => debug!(%peer, ?outcome, "ping unanswered"),
        }
        tokio::time::sleep(PING_INTERVAL.min(deadline.saturating_duration_since(Instant::now())))
            .await;
    }
}
