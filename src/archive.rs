//! Bundle Archiver: zips the finished workspace next to it.

use crate::error::{BundleError, Result};
use crate::fetch::is_partial_download;
use crate::manifest::Manifested;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub path: PathBuf,
    pub entries: usize,
    pub size: u64,
}

/// Write `<base>/offline_builder_v<tag>.zip` with every workspace file under
/// a `<tag>/` prefix. The archive is built in a temporary sibling and renamed
/// into place, so a failed run never leaves a truncated bundle behind.
pub fn archive_bundle(manifested: &Manifested<'_>) -> Result<ArchiveOutcome> {
    let workspace = manifested.workspace();
    let target = workspace.archive_path();
    let root = workspace.root();

    if target.exists() {
        tracing::debug!(path = %target.display(), "Replacing existing archive");
        fs::remove_file(&target)?;
    }

    let staging = tempfile::Builder::new()
        .prefix(".bundle-")
        .suffix(".zip.part")
        .tempfile_in(workspace.base())?;

    let entries = write_zip(&root, workspace.tag(), staging.as_file())?;
    staging
        .persist(&target)
        .map_err(|e| BundleError::Io(e.error))?;

    let size = fs::metadata(&target)?.len();
    tracing::info!(path = %target.display(), entries, size, "Bundle archived");
    Ok(ArchiveOutcome {
        path: target,
        entries,
        size,
    })
}

fn write_zip(root: &Path, prefix: &str, out: &File) -> Result<usize> {
    let mut zip = ZipWriter::new(out);
    let mut entries = 0;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_partial_download(&e.file_name().to_string_lossy()));
    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| BundleError::Io(io::Error::other(e)))?;
        let name = entry_name(prefix, relative);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(permissions(entry.path())?);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
            entries += 1;
        }
    }

    let mut out = zip.finish()?;
    out.flush()?;
    Ok(entries)
}

fn entry_name(prefix: &str, relative: &Path) -> String {
    let mut name = prefix.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

#[cfg(unix)]
fn permissions(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permissions(path: &Path) -> Result<u32> {
    Ok(if fs::metadata(path)?.is_dir() { 0o755 } else { 0o644 })
}
