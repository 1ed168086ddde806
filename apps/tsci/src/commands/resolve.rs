//! Resolve command for the tsci CLI.
//!
//! Shows which artifact `tsci install` would fetch for this runner, without
//! downloading it.
//!
//! ## Output Format
//!
//! ```text
//! Version:  1.80.0
//! Channel:  stable
//! Platform: linux-amd64
//! Artifact: tailscale_1.80.0_amd64.tgz
//! URL:      https://pkgs.tailscale.com/stable/tailscale_1.80.0_amd64.tgz
//! Strategy: ephemeral archive
//! ```

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::config::ReleaseInputs;
use crate::dist::{Channel, Platform, ReleaseClient};

/// Arguments for the resolve command.
#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub inputs: ReleaseInputs,

    /// Print the result as JSON.
    #[clap(long, short = 'j')]
    pub json: bool,
}

/// Resolution result for JSON output.
#[derive(Debug, Clone, Serialize)]
struct Resolved {
    version: String,
    channel: Channel,
    platform: String,
    artifact: String,
    url: String,
    strategy: String,
}

/// Executes the resolve command.
///
/// # Errors
///
/// Returns an error if the inputs are invalid, the platform is unsupported,
/// or the version cannot be resolved.
pub async fn execute(args: ResolveArgs) -> Result<()> {
    let target = args.inputs.into_target()?;
    let platform = Platform::detect(target.portable)?;
    let client = ReleaseClient::new(&target.pkgs_server)?;
    let release = client.resolve(&target.selector).await?;

    let artifact = platform.artifact_name(&release.version);
    let resolved = Resolved {
        url: client.artifact_url(release.channel, &artifact),
        version: release.version,
        channel: release.channel,
        platform: platform.to_string(),
        artifact,
        strategy: platform.strategy.to_string(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        println!("Version:  {}", resolved.version);
        println!("Channel:  {}", resolved.channel);
        println!("Platform: {}", resolved.platform);
        println!("Artifact: {}", resolved.artifact);
        println!("URL:      {}", resolved.url);
        println!("Strategy: {}", resolved.strategy);
    }
    Ok(())
}
