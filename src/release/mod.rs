//! Release resolution: turning a user-supplied tag (or "latest") into a
//! concrete [`Release`] with its downloadable assets.

pub mod github;

pub use github::GithubReleases;

use crate::error::{BundleError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// One published version of the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Normalized tag, without the leading `v`.
    pub tag: String,
    pub assets: Vec<Asset>,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
    /// Byte size as advertised by the release service, when it reports one.
    pub size: Option<u64>,
}

/// Source of release metadata.
pub trait ReleaseSource: Send + Sync {
    /// Resolve `tag` (already normalized), or the most recently published
    /// release when `tag` is `None`.
    fn resolve(&self, tag: Option<&str>) -> Result<Release>;
}

/// Strip a leading `v`/`V` version prefix.
///
/// Idempotent: `normalize_tag("v1.2.3") == normalize_tag("1.2.3")`.
pub fn normalize_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    match trimmed.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest.to_string(),
        _ => trimmed.to_string(),
    }
}

/// The tag as published: `v<tag>`.
pub fn published_tag(tag: &str) -> String {
    format!("v{}", normalize_tag(tag))
}

/// Interpret the `--release` argument: empty or `latest` means the newest
/// release, anything else must be a semantic version (with or without `v`).
pub fn parse_release_arg(arg: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = arg.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if raw.eq_ignore_ascii_case("latest") {
        return Ok(None);
    }

    let tag = normalize_tag(raw);
    semver::Version::parse(&tag).map_err(|e| {
        BundleError::InvalidConfig(format!("'{}' is not a release version: {}", raw, e))
    })?;
    Ok(Some(tag))
}

/// True when `tag` names exactly one directory below the output base.
fn is_directory_name(tag: &str) -> bool {
    if tag.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(tag).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Resolve a release and normalize its tag for use as a workspace name.
///
/// The tag becomes a directory and archive name, so anything that is not a
/// single plain path component is rejected before the caller touches disk.
pub fn resolve(source: &dyn ReleaseSource, tag: Option<&str>) -> Result<Release> {
    let mut release = source.resolve(tag.map(normalize_tag).as_deref())?;
    release.tag = normalize_tag(&release.tag);
    if release.tag.is_empty() {
        return Err(BundleError::ReleaseNotFound(
            "release service returned an empty tag".to_string(),
        ));
    }
    if !is_directory_name(&release.tag) {
        return Err(BundleError::ReleaseNotFound(format!(
            "release tag '{}' cannot be used as a directory name",
            release.tag
        )));
    }
    Ok(release)
}
