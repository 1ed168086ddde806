//! Integrity checks for downloaded artifacts.
//!
//! The expected SHA256 digest comes from configuration when supplied, else
//! from the detached `<artifact-url>.sha256` file the package server
//! publishes next to each artifact. Missing checksums are a warning; a
//! mismatch aborts the run before anything is installed.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::TsciError;

/// Outcome of [`verify_artifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The artifact's digest matched the expected value.
    Verified { sha256: String },
    /// No checksum could be obtained; the artifact was not checked.
    Unverified,
}

/// Verifies that a file matches the expected SHA256 checksum.
///
/// The expected value is compared case-insensitively after surrounding
/// whitespace is stripped; only the first whitespace-separated token is
/// used, so `sha256sum`-style `<digest>  <file>` lines are accepted too.
///
/// # Errors
///
/// Returns an error if the file cannot be read, or
/// [`TsciError::ChecksumMismatch`] if the digests differ.
pub fn verify_checksum(file_path: &Path, expected: &str) -> Result<String> {
    let expected = normalize_digest(expected);
    let computed = compute_sha256(file_path)?;

    if computed != expected {
        return Err(anyhow::Error::new(TsciError::checksum_mismatch(
            expected, &computed,
        ))
        .context(format!(
            "Checksum verification failed for {}; the download may be corrupted or tampered with",
            file_path.display()
        )));
    }

    Ok(computed)
}

/// Computes the SHA256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open file for checksum: {}", file_path.display()))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).with_context(|| {
            format!("Failed to read file for checksum: {}", file_path.display())
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn normalize_digest(raw: &str) -> String {
    raw.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Fetches the detached checksum published at `<artifact_url>.sha256`.
///
/// Best effort: any failure is logged and yields `None`.
pub async fn fetch_published_checksum(
    http: &reqwest::Client,
    artifact_url: &str,
) -> Option<String> {
    let url = format!("{artifact_url}.sha256");
    debug!(%url, "fetching published checksum");

    let response = match http.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(%url, error = %e, "could not fetch published checksum");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!(%url, status = %response.status(), "no published checksum");
        return None;
    }

    match response.text().await {
        Ok(body) if !normalize_digest(&body).is_empty() => Some(body),
        Ok(_) => {
            warn!(%url, "published checksum is empty");
            None
        }
        Err(e) => {
            warn!(%url, error = %e, "could not read published checksum");
            None
        }
    }
}

/// Verifies a downloaded artifact against the configured or published digest.
///
/// # Errors
///
/// Returns [`TsciError::ChecksumMismatch`] on a mismatch, or an I/O error if
/// the file cannot be hashed. Absence of any checksum is not an error.
pub async fn verify_artifact(
    http: &reqwest::Client,
    artifact_url: &str,
    file_path: &Path,
    provided: Option<&str>,
) -> Result<Verification> {
    let expected = match provided {
        Some(sum) => Some(sum.to_string()),
        None => fetch_published_checksum(http, artifact_url).await,
    };

    let Some(expected) = expected else {
        warn!(
            artifact = %file_path.display(),
            "no checksum available, skipping integrity verification"
        );
        return Ok(Verification::Unverified);
    };

    let sha256 = verify_checksum(file_path, &expected)?;
    Ok(Verification::Verified { sha256 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

    fn hello_file(name: &str) -> std::path::PathBuf {
        let temp_dir =
            std::env::temp_dir().join(format!("tsci_test_{name}_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&temp_dir).expect("Should create temp dir");
        let test_file = temp_dir.join("artifact.tgz");
        let mut file = std::fs::File::create(&test_file).expect("Should create test file");
        file.write_all(b"hello world\n")
            .expect("Should write test content");
        test_file
    }

    fn cleanup(file: &Path) {
        if let Some(dir) = file.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn compute_sha256_produces_correct_hash() {
        let file = hello_file("sha256");
        assert_eq!(compute_sha256(&file).expect("hash"), HELLO_SHA256);
        cleanup(&file);
    }

    #[test]
    fn verify_checksum_accepts_whitespace_and_mixed_case() {
        let file = hello_file("verify_mixed");
        let expected = format!("  \n{}\t\n", HELLO_SHA256.to_uppercase());
        assert!(verify_checksum(&file, &expected).is_ok());
        cleanup(&file);
    }

    #[test]
    fn verify_checksum_accepts_sha256sum_line() {
        let file = hello_file("verify_line");
        let expected = format!("{HELLO_SHA256}  artifact.tgz\n");
        assert!(verify_checksum(&file, &expected).is_ok());
        cleanup(&file);
    }

    #[test]
    fn verify_checksum_rejects_other_digest() {
        let file = hello_file("verify_fail");
        let err = verify_checksum(&file, "deadbeef").unwrap_err();
        match err.downcast_ref::<TsciError>() {
            Some(TsciError::ChecksumMismatch { expected, actual }) => {
                assert_eq!(expected, "deadbeef");
                assert_eq!(actual, HELLO_SHA256);
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
        cleanup(&file);
    }

    #[test]
    fn compute_sha256_fails_for_nonexistent_file() {
        assert!(compute_sha256(Path::new("/nonexistent/file/path")).is_err());
    }

    #[tokio::test]
    async fn provided_checksum_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let file = hello_file("provided");
        let url = format!("{}/stable/artifact.tgz", server.uri());
        let outcome = verify_artifact(&reqwest::Client::new(), &url, &file, Some(HELLO_SHA256))
            .await
            .expect("verified");
        assert_eq!(
            outcome,
            Verification::Verified {
                sha256: HELLO_SHA256.into()
            }
        );
        cleanup(&file);
    }

    #[tokio::test]
    async fn published_checksum_is_used_when_none_provided() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stable/artifact.tgz.sha256"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{HELLO_SHA256}\n")))
            .mount(&server)
            .await;

        let file = hello_file("published");
        let url = format!("{}/stable/artifact.tgz", server.uri());
        let outcome = verify_artifact(&reqwest::Client::new(), &url, &file, None)
            .await
            .expect("verified");
        assert!(matches!(outcome, Verification::Verified { .. }));
        cleanup(&file);
    }

    #[tokio::test]
    async fn published_mismatch_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stable/artifact.tgz.sha256"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0000"))
            .mount(&server)
            .await;

        let file = hello_file("published_bad");
        let url = format!("{}/stable/artifact.tgz", server.uri());
        let err = verify_artifact(&reqwest::Client::new(), &url, &file, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TsciError>(),
            Some(TsciError::ChecksumMismatch { .. })
        ));
        cleanup(&file);
    }

    #[tokio::test]
    async fn missing_checksum_is_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let file = hello_file("unavailable");
        let url = format!("{}/stable/artifact.tgz", server.uri());
        let outcome = verify_artifact(&reqwest::Client::new(), &url, &file, None)
            .await
            .expect("not fatal");
        assert_eq!(outcome, Verification::Unverified);
        cleanup(&file);
    }
}
