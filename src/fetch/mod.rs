//! Download-to-path with atomic commit.
//!
//! Later stages decide "already downloaded" purely by checking whether the
//! final path exists, so a file only ever appears there once its transfer
//! completed and produced at least one byte. Transfers stream into a hidden
//! sibling temp file that is removed on any failure.

pub mod http;

pub use http::HttpTransport;

use crate::cancel::{CancelToken, CancellableWriter};
use crate::error::{BundleError, Result};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const TEMP_PREFIX: &str = ".fetch-";
const TEMP_SUFFIX: &str = ".part";

/// True for the temp file of a transfer that never committed, e.g. one left
/// behind when the process was killed mid-download.
pub fn is_partial_download(file_name: &str) -> bool {
    file_name.starts_with(TEMP_PREFIX) && file_name.ends_with(TEMP_SUFFIX)
}

/// Moves bytes from a URL into a writer.
pub trait Transport: Send + Sync {
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<()>;
}

/// A file committed at its final path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub path: PathBuf,
    pub size: u64,
    /// The file already existed and no transfer was made.
    pub reused: bool,
}

pub struct AssetFetcher<'a> {
    transport: &'a dyn Transport,
    cancel: &'a CancelToken,
}

impl<'a> AssetFetcher<'a> {
    pub fn new(transport: &'a dyn Transport, cancel: &'a CancelToken) -> Self {
        Self { transport, cancel }
    }

    pub fn fetch(&self, url: &str, dest: &Path) -> Result<Fetched> {
        self.cancel.check()?;

        if let Ok(meta) = std::fs::metadata(dest) {
            if meta.is_file() {
                tracing::debug!(url, path = %dest.display(), "Reusing existing download");
                return Ok(Fetched {
                    path: dest.to_path_buf(),
                    size: meta.len(),
                    reused: true,
                });
            }
        }

        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        // Dropping the temp file deletes it, which covers every early return below.
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent)?;

        tracing::debug!(url, path = %dest.display(), "Downloading");
        let written = {
            let mut writer = CancellableWriter::new(BufWriter::new(temp.as_file_mut()), self.cancel);
            self.transport
                .download(url, &mut writer)
                .and_then(|()| writer.flush().map_err(BundleError::from))
                .map_err(|e| self.failure(url, e))?;
            writer.written()
        };

        if written == 0 {
            return Err(BundleError::DownloadFailed {
                url: url.to_string(),
                cause: "empty response body".to_string(),
            });
        }

        temp.as_file().sync_all()?;
        temp.persist(dest).map_err(|e| BundleError::DownloadFailed {
            url: url.to_string(),
            cause: format!("could not commit {}: {}", dest.display(), e.error),
        })?;

        Ok(Fetched {
            path: dest.to_path_buf(),
            size: written,
            reused: false,
        })
    }

    fn failure(&self, url: &str, err: BundleError) -> BundleError {
        if self.cancel.is_cancelled() {
            return BundleError::Cancelled;
        }
        let cause = match err {
            BundleError::Transport(cause) => cause,
            other => other.to_string(),
        };
        BundleError::DownloadFailed {
            url: url.to_string(),
            cause,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MapTransport;
    use super::*;
    use tempfile::TempDir;

    fn leftover_parts(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "part"))
            .collect()
    }

    #[test]
    fn test_fetch_commits_file() {
        let dir = TempDir::new().unwrap();
        let transport = MapTransport::default().with("https://example.com/a.bin", b"payload");
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let dest = dir.path().join("nested/a.bin");
        let fetched = fetcher.fetch("https://example.com/a.bin", &dest).unwrap();

        assert_eq!(fetched.size, 7);
        assert!(!fetched.reused);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
        assert!(leftover_parts(dest.parent().unwrap()).is_empty());
    }

    #[test]
    fn test_failed_fetch_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let transport = MapTransport::default();
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let dest = dir.path().join("missing.bin");
        let err = fetcher.fetch("https://example.com/missing.bin", &dest).unwrap_err();

        match err {
            BundleError::DownloadFailed { url, cause } => {
                assert_eq!(url, "https://example.com/missing.bin");
                assert!(cause.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
        assert!(leftover_parts(dir.path()).is_empty());
    }

    #[test]
    fn test_empty_body_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let transport = MapTransport::default().with("https://example.com/empty", b"");
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let dest = dir.path().join("empty");
        let err = fetcher.fetch("https://example.com/empty", &dest).unwrap_err();

        assert!(matches!(err, BundleError::DownloadFailed { .. }));
        assert!(!dest.exists());
        assert!(leftover_parts(dir.path()).is_empty());
    }

    #[test]
    fn test_existing_file_is_reused_without_transfer() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("done.bin");
        std::fs::write(&dest, b"already here").unwrap();

        let transport = MapTransport::default().with("https://example.com/done.bin", b"new");
        let cancel = CancelToken::new();
        let fetched = AssetFetcher::new(&transport, &cancel)
            .fetch("https://example.com/done.bin", &dest)
            .unwrap();

        assert!(fetched.reused);
        assert_eq!(fetched.size, 12);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(std::fs::read(&dest).unwrap(), b"already here");
    }

    #[test]
    fn test_cancelled_fetch_does_not_start() {
        let dir = TempDir::new().unwrap();
        let transport = MapTransport::default().with("https://example.com/a", b"x");
        let cancel = CancelToken::new();
        cancel.cancel();

        let dest = dir.path().join("a");
        let err = AssetFetcher::new(&transport, &cancel)
            .fetch("https://example.com/a", &dest)
            .unwrap_err();
        assert!(matches!(err, BundleError::Cancelled));
        assert!(!dest.exists());
        assert_eq!(transport.request_count(), 0);
    }

    struct CancelMidway<'a>(&'a CancelToken);

    impl Transport for CancelMidway<'_> {
        fn download(&self, _url: &str, sink: &mut dyn Write) -> Result<()> {
            sink.write_all(b"first chunk")?;
            self.0.cancel();
            sink.write_all(b"second chunk")?;
            Ok(())
        }
    }

    #[test]
    fn test_cancel_mid_transfer_cleans_up() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        let transport = CancelMidway(&cancel);

        let dest = dir.path().join("big.bin");
        let err = AssetFetcher::new(&transport, &cancel)
            .fetch("https://example.com/big.bin", &dest)
            .unwrap_err();

        assert!(matches!(err, BundleError::Cancelled));
        assert!(!dest.exists());
        assert!(leftover_parts(dir.path()).is_empty());
    }
}
