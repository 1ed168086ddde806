//! Artifact downloads from the package server.
//!
//! Downloads stream to `<dest>.tmp` and are renamed into place only once the
//! whole body has been written, so a half-written file is never verified or
//! installed. Failed attempts are retried with exponential backoff.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::release::USER_AGENT;
use crate::errors::TsciError;

/// Maximum number of download attempts.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Downloads `url` to `dest`, creating parent directories as needed.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns an error if every attempt fails, or if the destination cannot be
/// created or renamed.
pub async fn download_file(url: &str, dest: &Path) -> Result<u64> {
    let temp_path = dest.with_extension("tmp");

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to create HTTP client")?;

    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            let delay = calculate_retry_delay(attempt);
            println!("Retrying download (attempt {}/{MAX_RETRIES})...", attempt + 1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match fetch_to(&client, url, &temp_path).await {
            Ok(bytes) => {
                tokio::fs::rename(&temp_path, dest).await.with_context(|| {
                    format!(
                        "Failed to rename {} to {}",
                        temp_path.display(),
                        dest.display()
                    )
                })?;
                return Ok(bytes);
            }
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "download attempt failed");
                let _ = tokio::fs::remove_file(&temp_path).await;
                last_error = Some(e);
            }
        }
    }

    let error = last_error
        .unwrap_or_else(|| anyhow::anyhow!("Download failed after {MAX_RETRIES} attempts"));
    Err(error.context(TsciError::download(format!(
        "could not download {url} after {MAX_RETRIES} attempts"
    ))))
}

/// Streams one response body into `dest`.
async fn fetch_to(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP error {}: {url}", response.status());
    }

    let total_size = response.content_length().unwrap_or(0);
    debug!(%url, total_size, "download started");

    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("Failed to create file: {}", dest.display()))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let start_time = Instant::now();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Failed to read chunk from {url}"))?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write to {}", dest.display()))?;
        downloaded += chunk.len() as u64;
    }

    file.flush()
        .await
        .with_context(|| format!("Failed to flush {}", dest.display()))?;

    println!(
        "Downloaded {} in {:.1}s",
        format_bytes(downloaded),
        start_time.elapsed().as_secs_f64()
    );

    Ok(downloaded)
}

/// Formats bytes into a human-readable string (KB, MB, GB).
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Calculates the retry delay with exponential backoff and jitter.
///
/// The delay doubles with each attempt (1s, 2s, 4s) with +/- 25% jitter.
fn calculate_retry_delay(attempt: u32) -> u64 {
    let base_delay = BASE_RETRY_DELAY_MS * 2u64.pow(attempt);
    let jitter_range = base_delay / 4;
    let jitter = rand::rng().random_range(0..=jitter_range * 2);
    base_delay - jitter_range + jitter
}
