//! Archive extraction for the ephemeral install strategy.
//!
//! Release tarballs wrap their binaries in a single versioned folder
//! (`tailscale_1.80.0_amd64/tailscale`). When every entry shares one root
//! folder it is stripped, so the binaries land directly in the destination.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use tar::Archive;

/// Extracts a `.tgz`/`.tar.gz` or `.zip` archive, chosen by file extension.
///
/// # Errors
///
/// Returns an error if the extension is not recognized, the archive is
/// malformed, or an entry would escape `dest_dir`.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let name = archive_path.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        extract_tar_gz(archive_path, dest_dir)
    } else if name.ends_with(".zip") {
        extract_zip(archive_path, dest_dir)
    } else {
        bail!("Unrecognized archive format: {}", archive_path.display())
    }
}

/// Extracts a tar.gz archive into `dest_dir`.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or written out.
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    let strip_prefix = {
        let mut archive = open_tar(archive_path)?;
        let mut paths = Vec::new();
        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read tar entries: {}", archive_path.display()))?
        {
            let entry = entry
                .with_context(|| format!("Failed to read tar entry: {}", archive_path.display()))?;
            paths.push(entry.path().context("Failed to get entry path")?.into_owned());
        }
        common_root(&paths)
    };

    let mut archive = open_tar(archive_path)?;
    for entry in archive
        .entries()
        .with_context(|| format!("Failed to read tar entries: {}", archive_path.display()))?
    {
        let mut entry = entry
            .with_context(|| format!("Failed to read tar entry: {}", archive_path.display()))?;
        let entry_path = entry.path().context("Failed to get entry path")?.into_owned();

        let Some(output_path) = output_path(dest_dir, &entry_path, strip_prefix.as_deref())?
        else {
            continue;
        };

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&output_path).with_context(|| {
                format!("Failed to create directory: {}", output_path.display())
            })?;
        } else {
            ensure_parent(&output_path)?;
            entry
                .unpack(&output_path)
                .with_context(|| format!("Failed to extract: {}", output_path.display()))?;
        }
    }

    Ok(())
}

/// Extracts a ZIP archive into `dest_dir`.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or written out.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {}", archive_path.display()))?;

    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    let mut paths = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read archive entry {i}"))?;
        let path = entry
            .enclosed_name()
            .with_context(|| format!("Invalid entry path in archive: entry {i}"))?;
        paths.push(path);
    }
    let strip_prefix = common_root(&paths);

    for (i, entry_path) in paths.iter().enumerate() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read archive entry {i}"))?;

        let Some(output_path) = output_path(dest_dir, entry_path, strip_prefix.as_deref())? else {
            continue;
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&output_path).with_context(|| {
                format!("Failed to create directory: {}", output_path.display())
            })?;
        } else {
            ensure_parent(&output_path)?;
            let mut outfile = std::fs::File::create(&output_path)
                .with_context(|| format!("Failed to create file: {}", output_path.display()))?;
            std::io::copy(&mut entry, &mut outfile)
                .with_context(|| format!("Failed to extract: {}", output_path.display()))?;
        }
    }

    Ok(())
}

fn open_tar(archive_path: &Path) -> Result<Archive<GzDecoder<std::fs::File>>> {
    let file = std::fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Maps an archive entry onto its destination path.
///
/// Returns `None` for the stripped root folder itself. Entries with parent
/// directory references or absolute paths are rejected.
fn output_path(dest_dir: &Path, entry_path: &Path, strip: Option<&Path>) -> Result<Option<PathBuf>> {
    if entry_path.is_absolute()
        || entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        bail!(
            "Refusing to extract path with parent directory or absolute reference: {}",
            entry_path.display()
        );
    }

    let relative = match strip.map(|prefix| entry_path.strip_prefix(prefix)) {
        Some(Ok(p)) if p.as_os_str().is_empty() => return Ok(None),
        Some(Ok(p)) => p.to_path_buf(),
        _ => entry_path.to_path_buf(),
    };

    Ok(Some(dest_dir.join(relative)))
}

/// Finds a root folder shared by every entry.
///
/// Only returns a prefix when at least one entry is nested below it, so a
/// flat archive holding a single file is never stripped to nothing.
fn common_root(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut root: Option<&std::ffi::OsStr> = None;
    let mut nested = false;

    for path in paths {
        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        let first = components.next()?.as_os_str();
        if components.next().is_some() {
            nested = true;
        }
        match root {
            None => root = Some(first),
            Some(existing) if existing != first => return None,
            Some(_) => {}
        }
    }

    if nested { root.map(PathBuf::from) } else { None }
}

/// Marks the given files executable (Unix only; no-op elsewhere).
///
/// # Errors
///
/// Returns an error if an existing file's permissions cannot be changed.
#[cfg(unix)]
pub fn set_executable_permissions(files: &[&Path]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for path in files.iter().filter(|p| p.is_file()) {
        let mut perms = std::fs::metadata(path)
            .with_context(|| format!("Failed to get metadata: {}", path.display()))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("Failed to set permissions: {}", path.display()))?;
    }
    Ok(())
}

/// Sets executable permissions (no-op on Windows).
#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
pub fn set_executable_permissions(_files: &[&Path]) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::Builder;

    fn temp_test_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("tsci_test_{}_{}", name, rand::random::<u64>()));
        std::fs::create_dir_all(&dir).expect("Should create temp dir");
        dir
    }

    fn create_tgz(archive_path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(archive_path).expect("Should create file");
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, name, *data)
                .expect("Should append file");
        }
        builder
            .into_inner()
            .expect("Should finish tar")
            .finish()
            .expect("Should finish gzip");
    }

    fn create_zip(archive_path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(archive_path).expect("Should create file");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).expect("Should start file");
            zip.write_all(data).expect("Should write");
        }
        zip.finish().expect("Should finish zip");
    }

    #[test]
    fn release_tarball_root_folder_is_stripped() {
        let dir = temp_test_dir("tgz_strip");
        let archive = dir.join("tailscale_1.80.0_amd64.tgz");
        create_tgz(
            &archive,
            &[
                ("tailscale_1.80.0_amd64/tailscale", b"client"),
                ("tailscale_1.80.0_amd64/tailscaled", b"daemon"),
                ("tailscale_1.80.0_amd64/systemd/tailscaled.service", b"unit"),
            ],
        );
        let out = dir.join("out");

        extract_archive(&archive, &out).expect("extract");

        assert_eq!(std::fs::read(out.join("tailscale")).expect("read"), b"client");
        assert_eq!(std::fs::read(out.join("tailscaled")).expect("read"), b"daemon");
        assert!(out.join("systemd").join("tailscaled.service").is_file());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn flat_tarball_is_not_stripped() {
        let dir = temp_test_dir("tgz_flat");
        let archive = dir.join("flat.tgz");
        create_tgz(&archive, &[("tailscale", b"client")]);
        let out = dir.join("out");

        extract_archive(&archive, &out).expect("extract");

        assert!(out.join("tailscale").is_file());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn zip_root_folder_is_stripped() {
        let dir = temp_test_dir("zip_strip");
        let archive = dir.join("tailscale_1.80.0_amd64.zip");
        create_zip(
            &archive,
            &[
                ("tailscale_1.80.0_amd64/tailscale.exe", b"client"),
                ("tailscale_1.80.0_amd64/tailscaled.exe", b"daemon"),
            ],
        );
        let out = dir.join("out");

        extract_archive(&archive, &out).expect("extract");

        assert!(out.join("tailscale.exe").is_file());
        assert!(out.join("tailscaled.exe").is_file());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn mixed_roots_keep_structure() {
        let dir = temp_test_dir("zip_mixed");
        let archive = dir.join("mixed.zip");
        create_zip(&archive, &[("a/one", b"1"), ("b/two", b"2")]);
        let out = dir.join("out");

        extract_archive(&archive, &out).expect("extract");

        assert!(out.join("a").join("one").is_file());
        assert!(out.join("b").join("two").is_file());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = extract_archive(Path::new("tailscale.rpm"), Path::new("out")).unwrap_err();
        assert!(err.to_string().contains("Unrecognized archive format"));
    }

    #[test]
    fn parent_references_are_rejected() {
        let err = output_path(Path::new("/dest"), Path::new("../etc/passwd"), None).unwrap_err();
        assert!(err.to_string().contains("Refusing to extract"));
    }

    #[test]
    fn common_root_requires_nesting() {
        assert_eq!(common_root(&[PathBuf::from("tailscale")]), None);
        assert_eq!(
            common_root(&[PathBuf::from("root/"), PathBuf::from("root/bin")]),
            Some(PathBuf::from("root"))
        );
        assert_eq!(common_root(&[]), None);
    }

    #[cfg(unix)]
    #[test]
    fn set_executable_permissions_sets_755() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_test_dir("perms");
        let bin = dir.join("tailscaled");
        std::fs::write(&bin, b"daemon").expect("write");
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o644)).expect("chmod");

        set_executable_permissions(&[&bin, &dir.join("missing")]).expect("perms");

        let mode = std::fs::metadata(&bin).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        std::fs::remove_dir_all(&dir).ok();
    }
}
