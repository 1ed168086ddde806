//! Scratch directories and search-path publication.
//!
//! ## Directory Structure
//!
//! ```text
//! $RUNNER_TEMP/tsci/             # root (or --work-dir / TSCI_WORK_DIR)
//!   downloads/                   # artifacts, deleted after install
//!   tailscale_1.80.0_amd64/      # extracted binaries (ephemeral archive)
//!     tailscale
//!     tailscaled
//! ```
//!
//! Extracted binaries are made reachable for later job steps by appending
//! their directory to the file named by `GITHUB_PATH`, which the runner
//! prepends to `PATH` for every subsequent step.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable naming the runner's per-job temporary directory.
pub const RUNNER_TEMP_ENV: &str = "RUNNER_TEMP";

/// Environment variable naming the file of directories to add to `PATH`.
pub const GITHUB_PATH_ENV: &str = "GITHUB_PATH";

/// Subdirectory name used under the temporary directory.
const WORK_DIR_NAME: &str = "tsci";

/// Scratch locations for one run.
#[derive(Debug, Clone)]
pub struct WorkPaths {
    pub root: PathBuf,
    pub downloads: PathBuf,
}

impl WorkPaths {
    /// Creates paths rooted at `root_override`, else `$RUNNER_TEMP/tsci`,
    /// else the system temporary directory.
    #[must_use]
    pub fn new(root_override: Option<&Path>) -> Self {
        let root = root_override.map_or_else(
            || {
                std::env::var_os(RUNNER_TEMP_ENV)
                    .filter(|s| !s.is_empty())
                    .map_or_else(std::env::temp_dir, PathBuf::from)
                    .join(WORK_DIR_NAME)
            },
            Path::to_path_buf,
        );
        Self {
            downloads: root.join("downloads"),
            root,
        }
    }

    /// Creates the root and downloads directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.downloads)
            .with_context(|| format!("Failed to create directory: {}", self.downloads.display()))
    }

    /// Returns where an artifact is downloaded to.
    #[must_use]
    pub fn download_path(&self, file_name: &str) -> PathBuf {
        self.downloads.join(file_name)
    }

    /// Returns the extraction directory for a version/architecture pair.
    #[must_use]
    pub fn install_dir(&self, version: &str, arch: &str) -> PathBuf {
        self.root.join(format!("tailscale_{version}_{arch}"))
    }
}

/// Result of publishing a directory on the job's search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    /// The directory was appended to the path file.
    Appended { path_file: PathBuf },
    /// The path file already listed the directory.
    AlreadyPresent { path_file: PathBuf },
    /// No path file is configured for this environment.
    Unavailable,
}

/// Publishes `dir` on the search path of subsequent job steps via
/// `GITHUB_PATH`.
///
/// # Errors
///
/// Returns an error if the path file exists but cannot be read or written.
pub fn publish_search_path(dir: &Path) -> Result<Publication> {
    match std::env::var_os(GITHUB_PATH_ENV).filter(|s| !s.is_empty()) {
        Some(file) => append_to_path_file(Path::new(&file), dir),
        None => Ok(Publication::Unavailable),
    }
}

/// Appends `dir` as a line of `path_file` unless it is already listed.
///
/// # Errors
///
/// Returns an error if the file cannot be read or appended to.
pub fn append_to_path_file(path_file: &Path, dir: &Path) -> Result<Publication> {
    let line = dir.display().to_string();

    let existing = match std::fs::read_to_string(path_file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read path file: {}", path_file.display()));
        }
    };

    if existing.lines().any(|l| l.trim() == line) {
        return Ok(Publication::AlreadyPresent {
            path_file: path_file.to_path_buf(),
        });
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path_file)
        .with_context(|| format!("Failed to open path file: {}", path_file.display()))?;

    let separator = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    writeln!(file, "{separator}{line}")
        .with_context(|| format!("Failed to write path file: {}", path_file.display()))?;

    Ok(Publication::Appended {
        path_file: path_file.to_path_buf(),
    })
}

/// Returns the shell line a user would add to reach `dir` manually.
#[must_use]
pub fn manual_path_hint(dir: &Path) -> String {
    if cfg!(windows) {
        format!("$env:Path = \"{};$env:Path\"", dir.display())
    } else {
        format!("export PATH=\"{}:$PATH\"", dir.display())
    }
}
