use crate::config::BuilderConfig;
use crate::error::{BundleError, Result};
use crate::utils::path::dir_size;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const BINARIES_DIR: &str = "binaries";
pub const DEFINITIONS_DIR: &str = "definitions";
pub const TOOLS_DIR: &str = "tools";
pub const CONFIG_DIR: &str = "config";

pub const TOOL_MANIFEST: &str = "external_tools_manifest.csv";
pub const BINARIES_MANIFEST: &str = "binaries_manifest.json";
pub const ENVIRONMENT_INFO: &str = "environment_info.json";
pub const SUMMARY: &str = "BUNDLE_SUMMARY.md";

/// Files written by the manifest stage; excluded from the workspace size so
/// rebuilt manifests stay stable.
pub const MANIFEST_FILES: &[&str] = &[TOOL_MANIFEST, BINARIES_MANIFEST, ENVIRONMENT_INFO, SUMMARY];

/// On-disk tree for one release: `<base>/<tag>/`.
#[derive(Debug, Clone)]
pub struct Workspace {
    base: PathBuf,
    tag: String,
}

impl Workspace {
    /// Describe the workspace for `tag` under `base` without touching disk.
    pub fn new(base: &Path, tag: &str) -> Self {
        Self {
            base: base.to_path_buf(),
            tag: tag.to_string(),
        }
    }

    /// Create the directory tree. With `force` an existing tree is removed
    /// first; otherwise it is reused as-is so completed downloads are kept.
    pub fn prepare(base: &Path, tag: &str, force: bool) -> Result<Self> {
        let workspace = Self::new(base, tag);
        let root = workspace.root();

        if force && root.exists() {
            tracing::info!(path = %root.display(), "Removing existing workspace");
            fs::remove_dir_all(&root)?;
        }

        for dir in [BINARIES_DIR, DEFINITIONS_DIR, TOOLS_DIR, CONFIG_DIR] {
            fs::create_dir_all(root.join(dir))?;
        }

        Ok(workspace)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn root(&self) -> PathBuf {
        self.base.join(&self.tag)
    }

    pub fn binaries_dir(&self) -> PathBuf {
        self.root().join(BINARIES_DIR)
    }

    pub fn platform_dir(&self, key: &str) -> PathBuf {
        self.binaries_dir().join(key)
    }

    pub fn definitions_dir(&self) -> PathBuf {
        self.root().join(DEFINITIONS_DIR)
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root().join(TOOLS_DIR)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join(CONFIG_DIR)
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    /// `<base>/offline_builder_v<tag>.zip`
    pub fn archive_path(&self) -> PathBuf {
        self.base.join(format!("offline_builder_v{}.zip", self.tag))
    }

    /// Record the effective builder configuration inside the bundle.
    pub fn write_config(&self, config: &BuilderConfig) -> Result<PathBuf> {
        let path = self.config_dir().join("builder.toml");
        let contents =
            toml::to_string_pretty(config).map_err(|e| BundleError::InvalidConfig(e.to_string()))?;
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Persist a stage's result as `config/<name>.json` so the next stage
    /// reads it from disk.
    pub fn save_record<T: Serialize>(&self, name: &str, record: &T) -> Result<()> {
        let path = self.record_path(name);
        let mut contents = serde_json::to_string_pretty(record)?;
        contents.push('\n');
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn load_record<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.record_path(name);
        let contents = fs::read_to_string(&path).map_err(|e| {
            BundleError::Io(std::io::Error::new(
                e.kind(),
                format!("stage record {} unavailable: {}", path.display(), e),
            ))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.config_dir().join(format!("{}.json", name))
    }

    /// Path relative to the workspace root, with `/` separators, for manifests.
    pub fn relative(&self, path: &Path) -> String {
        let root = self.root();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Bytes on disk, not counting the manifest files themselves.
    pub fn total_size(&self) -> u64 {
        dir_size(&self.root(), MANIFEST_FILES)
    }
}
