use super::{published_tag, Asset, Release, ReleaseSource};
use crate::error::Result;
use self_update::update::ReleaseUpdate;

/// Release metadata from the GitHub releases API, via self_update's backend.
pub struct GithubReleases {
    owner: String,
    name: String,
}

impl GithubReleases {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    fn updater(&self) -> Result<Box<dyn ReleaseUpdate>> {
        // bin_name and current_version are required by the builder but unused
        // for metadata lookups.
        let updater = self_update::backends::github::Update::configure()
            .repo_owner(&self.owner)
            .repo_name(&self.name)
            .bin_name(&self.name)
            .current_version("0.0.0")
            .no_confirm(true)
            .build()?;
        Ok(updater)
    }
}

impl ReleaseSource for GithubReleases {
    fn resolve(&self, tag: Option<&str>) -> Result<Release> {
        let updater = self.updater()?;
        let release = match tag {
            Some(tag) => {
                tracing::debug!(repo = %self.name, tag = %published_tag(tag), "Resolving tagged release");
                updater.get_release_version(&published_tag(tag))?
            }
            None => {
                tracing::debug!(repo = %self.name, "Resolving latest release");
                updater.get_latest_release()?
            }
        };

        Ok(Release {
            tag: release.version,
            assets: release
                .assets
                .into_iter()
                .map(|asset| Asset {
                    name: asset.name,
                    download_url: asset.download_url,
                    size: None,
                })
                .collect(),
        })
    }
}
