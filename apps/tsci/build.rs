//! Build script for the tsci CLI.
//!
//! Embeds the git commit and the target triple so `tsci version -v` can
//! report exactly which build ran inside a CI job.

use std::process::Command;

fn main() {
    let commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=TSCI_GIT_COMMIT={commit}");

    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".into());
    println!("cargo:rustc-env=TSCI_BUILD_TARGET={target}");

    if let Some(root) = git(&["rev-parse", "--show-toplevel"]) {
        println!("cargo:rerun-if-changed={root}/.git/HEAD");
    }
}

/// Runs a git command and returns its trimmed stdout, if any.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
