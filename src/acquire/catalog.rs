use crate::error::{BundleError, Result};
use crate::extract::{extract_archive, ArchiveFormat};
use crate::fetch::AssetFetcher;
use crate::release::Release;
use crate::report::{Reporter, Stage};
use crate::workspace::Workspace;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;

pub const RECORD: &str = "catalog";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogOutcome {
    /// Name of the catalog asset, if the release carries one.
    pub asset: Option<String>,
    /// Downloaded archive, relative to the workspace root.
    pub archive: Option<String>,
    /// Files unpacked into `definitions/`.
    pub files: usize,
    pub reused: bool,
}

/// Fetch the artifact catalog and unpack it into `definitions/`.
///
/// A release without a catalog asset yields an empty outcome and a warning;
/// a catalog that exists but cannot be fetched or unpacked is fatal.
pub fn acquire_catalog(
    release: &Release,
    pattern: &Regex,
    workspace: &Workspace,
    fetcher: &AssetFetcher<'_>,
    reporter: &Reporter,
) -> Result<CatalogOutcome> {
    let mut matching = release.assets.iter().filter(|a| pattern.is_match(&a.name));
    let Some(asset) = matching.next() else {
        reporter.warn(
            Stage::Catalog,
            &release.tag,
            format!("no artifact catalog matching '{}' in release", pattern.as_str()),
        );
        return Ok(CatalogOutcome::default());
    };
    if let Some(extra) = matching.next() {
        tracing::debug!(chosen = %asset.name, ignored = %extra.name, "Multiple catalog assets");
    }

    let dest = workspace.config_dir().join(&asset.name);
    let fetched = fetcher
        .fetch(&asset.download_url, &dest)
        .map_err(|e| match e {
            BundleError::Cancelled => BundleError::Cancelled,
            other => BundleError::CatalogFailed(other.to_string()),
        })?;

    // Start from an empty tree so definitions removed upstream do not linger.
    let definitions = workspace.definitions_dir();
    if definitions.exists() {
        fs::remove_dir_all(&definitions)?;
    }

    let format = ArchiveFormat::from_name(&asset.name).unwrap_or(ArchiveFormat::Zip);
    let files = extract_archive(&fetched.path, &definitions, format)
        .map_err(|e| BundleError::CatalogFailed(e.to_string()))?;

    reporter.success(format!("{} → {} files", asset.name, files));

    Ok(CatalogOutcome {
        asset: Some(asset.name.clone()),
        archive: Some(workspace.relative(&fetched.path)),
        files,
        reused: fetched.reused,
    })
}
