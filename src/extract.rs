//! Archive extraction for the catalog and downloaded tool packages.
//!
//! Entries that would land outside the destination (absolute paths, `..`
//! components, symlinks and hardlinks) are skipped rather than failing the
//! whole archive.

use crate::error::{BundleError, Result};
use crate::utils::path::is_contained;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Format implied by a file name's suffix.
    pub fn from_name(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }

    /// Like [`ArchiveFormat::from_name`], limited to the enabled suffixes.
    pub fn detect(file_name: &str, enabled: &[String]) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        enabled
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_ascii_lowercase()))
            .then(|| Self::from_name(file_name))
            .flatten()
    }

    /// File name with the archive suffix removed.
    pub fn stem<'a>(&self, file_name: &'a str) -> &'a str {
        let lower = file_name.to_ascii_lowercase();
        let cut = [".tar.gz", ".tgz", ".zip"]
            .iter()
            .find(|suffix| lower.ends_with(*suffix))
            .map_or(0, |suffix| suffix.len());
        &file_name[..file_name.len() - cut]
    }
}

/// Extract `archive` into `dest`, returning the number of files written.
pub fn extract_archive(archive: &Path, dest: &Path, format: ArchiveFormat) -> Result<usize> {
    tracing::debug!(
        archive = %archive.display(),
        dest = %dest.display(),
        ?format,
        "Extracting"
    );

    let fail = |cause: String| BundleError::ExtractionFailed {
        path: archive.to_path_buf(),
        cause,
    };

    fs::create_dir_all(dest).map_err(|e| fail(e.to_string()))?;
    let file = File::open(archive).map_err(|e| fail(e.to_string()))?;

    let written = match format {
        ArchiveFormat::Zip => extract_zip(file, dest),
        ArchiveFormat::TarGz => {
            extract_tar(flate2::read::GzDecoder::new(BufReader::new(file)), dest)
        }
    };
    written.map_err(|e| fail(e.to_string()))
}

fn extract_zip(file: File, dest: &Path) -> io::Result<usize> {
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "Skipping unsafe path in zip");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        write_entry(&mut entry, &target)?;
        #[cfg(unix)]
        preserve_exec_bit(&target, entry.unix_mode())?;
        written += 1;
    }

    Ok(written)
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut written = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            tracing::warn!("Skipping link entry in tar archive");
            continue;
        }

        let relative: PathBuf = entry.path()?.into_owned();
        if !is_contained(&relative) {
            tracing::warn!(entry = %relative.display(), "Skipping unsafe path in tar");
            continue;
        }
        let target = dest.join(&relative);

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            let mode = entry.header().mode().ok();
            write_entry(&mut entry, &target)?;
            #[cfg(unix)]
            preserve_exec_bit(&target, mode)?;
            #[cfg(not(unix))]
            let _ = mode;
            written += 1;
        }
    }

    Ok(written)
}

fn write_entry(reader: &mut impl Read, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(target)?;
    io::copy(reader, &mut out)?;
    Ok(())
}

#[cfg(unix)]
fn preserve_exec_bit(path: &Path, mode: Option<u32>) -> io::Result<()> {
    match mode {
        Some(mode) if mode & 0o111 != 0 => mark_executable(path),
        _ => Ok(()),
    }
}

/// Add `0o755` to a file's permissions. No-op off Unix.
#[allow(unused_variables)]
pub fn mark_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)?.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}
