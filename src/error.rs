use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Release not found: {0}")]
    ReleaseNotFound(String),

    #[error("Release service unreachable: {0}")]
    ReleaseServiceUnreachable(String),

    #[error("Download failed for {url}: {cause}")]
    DownloadFailed { url: String, cause: String },

    #[error("Extraction failed for {}: {cause}", path.display())]
    ExtractionFailed { path: PathBuf, cause: String },

    #[error("Could not parse definition file {}: {cause}", file.display())]
    DefinitionParseFailed { file: PathBuf, cause: String },

    #[error("Artifact catalog could not be acquired: {0}")]
    CatalogFailed(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Transfer error: {0}")]
    Transport(String),
}

impl From<self_update::errors::Error> for BundleError {
    fn from(err: self_update::errors::Error) -> Self {
        use self_update::errors::Error as UpdateError;

        match err {
            // The GitHub backend reports non-2xx API responses as network errors
            // carrying the status code.
            UpdateError::Network(msg) if msg.contains("404") => BundleError::ReleaseNotFound(msg),
            UpdateError::Release(msg) => BundleError::ReleaseNotFound(msg),
            other => BundleError::ReleaseServiceUnreachable(other.to_string()),
        }
    }
}

impl From<regex::Error> for BundleError {
    fn from(err: regex::Error) -> Self {
        BundleError::InvalidConfig(err.to_string())
    }
}

impl From<walkdir::Error> for BundleError {
    fn from(err: walkdir::Error) -> Self {
        BundleError::Io(err.into())
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;
