use crate::error::{BundleError, Result};
use crate::extract::mark_executable;
use crate::fetch::AssetFetcher;
use crate::platform::PlatformSpec;
use crate::release::Release;
use crate::report::{Reporter, Stage};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};

pub const RECORD: &str = "binaries";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiredBinary {
    pub platform: String,
    pub asset: String,
    /// Relative to the workspace root.
    pub file: String,
    pub size: u64,
    /// Size advertised by the release service, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_size: Option<u64>,
    pub executable: bool,
    pub reused: bool,
}

impl AcquiredBinary {
    pub fn size_mismatch(&self) -> bool {
        self.expected_size.is_some_and(|expected| expected != self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBinary {
    pub platform: String,
    pub asset: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryOutcome {
    pub acquired: Vec<AcquiredBinary>,
    /// Platforms with no matching asset in the release.
    pub skipped: Vec<String>,
    pub failed: Vec<FailedBinary>,
}

/// Fetch one binary per platform into `binaries/<platform>/`.
///
/// A platform without a matching asset, or whose download fails, is reported
/// and skipped; only cancellation aborts the stage.
pub fn acquire_binaries(
    release: &Release,
    platforms: &[PlatformSpec],
    workspace: &Workspace,
    fetcher: &AssetFetcher<'_>,
    reporter: &Reporter,
) -> Result<BinaryOutcome> {
    let mut outcome = BinaryOutcome::default();

    for platform in platforms {
        let Some(asset) = platform.select(&release.assets)? else {
            reporter.warn(
                Stage::Binaries,
                &platform.key,
                format!("no asset in release {} matches '{}'", release.tag, platform.pattern),
            );
            outcome.skipped.push(platform.key.clone());
            continue;
        };

        let dest = workspace
            .platform_dir(&platform.key)
            .join(platform.output_name(asset));

        let fetched = match fetcher.fetch(&asset.download_url, &dest) {
            Ok(fetched) => fetched,
            Err(BundleError::Cancelled) => return Err(BundleError::Cancelled),
            Err(e) => {
                reporter.warn(Stage::Binaries, &asset.download_url, e.to_string());
                outcome.failed.push(FailedBinary {
                    platform: platform.key.clone(),
                    asset: asset.name.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        if platform.executable {
            mark_executable(&fetched.path)?;
        }

        if let Some(expected) = asset.size.filter(|expected| *expected != fetched.size) {
            reporter.warn(
                Stage::Binaries,
                &platform.key,
                format!("{} is {} bytes, release lists {}", asset.name, fetched.size, expected),
            );
        }

        reporter.success(format!(
            "{} ← {} ({} bytes{})",
            platform.key,
            asset.name,
            fetched.size,
            if fetched.reused { ", reused" } else { "" }
        ));

        outcome.acquired.push(AcquiredBinary {
            platform: platform.key.clone(),
            asset: asset.name.clone(),
            file: workspace.relative(&fetched.path),
            size: fetched.size,
            expected_size: asset.size,
            executable: platform.executable,
            reused: fetched.reused,
        });
    }

    Ok(outcome)
}
