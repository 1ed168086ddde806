//! Tailscale distribution pipeline.
//!
//! Resolves a release for the runner's platform, downloads and verifies the
//! artifact, and installs it with the platform's strategy.
//!
//! ## Modules
//!
//! - [`platform`] - Runner OS/architecture and artifact naming
//! - [`release`] - Release track metadata and version selection
//! - [`download`] - Artifact download with retries
//! - [`verify`] - SHA256 checksum verification
//! - [`archive`] - tar.gz and zip extraction
//! - [`install`] - One installer per install strategy
//! - [`paths`] - Work directories and search path publication
//! - [`resolver`] - Client and daemon binary location

pub mod archive;
pub mod download;
pub mod install;
pub mod paths;
pub mod platform;
pub mod release;
pub mod resolver;
pub mod verify;

pub use download::download_file;
pub use install::{Installation, Installer};
pub use paths::WorkPaths;
pub use platform::Platform;
pub use release::{Channel, Release, ReleaseClient};
pub use verify::{Verification, verify_artifact};
