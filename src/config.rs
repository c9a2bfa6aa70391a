use crate::error::{BundleError, Result};
use crate::platform::{default_platforms, PlatformSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "offline-builder.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformSpec>,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            platforms: default_platforms(),
            catalog: CatalogConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_repo_owner")]
    pub repo_owner: String,

    #[serde(default = "default_repo_name")]
    pub repo_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repo_owner: default_repo_owner(),
            repo_name: default_repo_name(),
        }
    }
}

fn default_repo_owner() -> String {
    "Velocidex".to_string()
}

fn default_repo_name() -> String {
    "velociraptor".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Regular expression selecting the artifact catalog asset
    #[serde(default = "default_catalog_pattern")]
    pub pattern: String,

    /// Extensions (without dot) of definition files inside the catalog
    #[serde(default = "default_definition_extensions")]
    pub extensions: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            pattern: default_catalog_pattern(),
            extensions: default_definition_extensions(),
        }
    }
}

fn default_catalog_pattern() -> String {
    r"^artifact_pack.*\.zip$".to_string()
}

fn default_definition_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Concurrent tool downloads
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// File suffixes treated as extractable archives
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            archive_extensions: default_archive_extensions(),
        }
    }
}

fn default_jobs() -> usize {
    4
}

fn default_archive_extensions() -> Vec<String> {
    vec![".zip".to_string(), ".tar.gz".to_string(), ".tgz".to_string()]
}

impl BuilderConfig {
    /// Load configuration with precedence:
    /// 1. CLI flags (applied later via with_jobs / with_repo)
    /// 2. Environment variables
    /// 3. Explicit --config file
    /// 4. Project config (offline-builder.toml in the working directory)
    /// 5. Global config (~/.offline-builder.toml)
    /// 6. Built-in defaults
    pub fn load(project_root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = home_dir() {
            let global_config = home.join(format!(".{}", CONFIG_FILE_NAME));
            if global_config.exists() {
                config = config.merge(Self::from_file(&global_config)?);
            }
        }

        let project_config = project_root.join(CONFIG_FILE_NAME);
        if project_config.exists() {
            config = config.merge(Self::from_file(&project_config)?);
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(BundleError::InvalidConfig(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            config = config.merge(Self::from_file(path)?);
        }

        config = config.merge_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BuilderConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes precedence where it
    /// differs from the built-in defaults)
    fn merge(mut self, other: Self) -> Self {
        if other.source.repo_owner != default_repo_owner() {
            self.source.repo_owner = other.source.repo_owner;
        }
        if other.source.repo_name != default_repo_name() {
            self.source.repo_name = other.source.repo_name;
        }

        // Platform lists replace rather than append, so a file can drop a target
        if other.platforms != default_platforms() {
            self.platforms = other.platforms;
        }

        if other.catalog.pattern != default_catalog_pattern() {
            self.catalog.pattern = other.catalog.pattern;
        }
        if other.catalog.extensions != default_definition_extensions() {
            self.catalog.extensions = other.catalog.extensions;
        }

        if other.tools.jobs != default_jobs() {
            self.tools.jobs = other.tools.jobs;
        }
        if other.tools.archive_extensions != default_archive_extensions() {
            self.tools.archive_extensions = other.tools.archive_extensions;
        }

        self
    }

    /// Apply environment variable overrides
    fn merge_env(mut self) -> Result<Self> {
        if let Ok(repo) = std::env::var("OFFLINE_BUILDER_REPO") {
            self = self.with_repo(&repo)?;
        }

        if let Ok(jobs) = std::env::var("OFFLINE_BUILDER_JOBS") {
            if let Ok(jobs) = jobs.parse::<usize>() {
                self.tools.jobs = jobs;
            }
        }

        Ok(self)
    }

    /// Override the release repository from an `owner/name` string
    pub fn with_repo(mut self, repo: &str) -> Result<Self> {
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                self.source.repo_owner = owner.to_string();
                self.source.repo_name = name.to_string();
                Ok(self)
            }
            _ => Err(BundleError::InvalidConfig(format!(
                "Repository must be given as owner/name, got '{}'",
                repo
            ))),
        }
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        if let Some(jobs) = jobs {
            self.tools.jobs = jobs;
        }
        self
    }

    /// Reject configurations that would fail mid-run
    pub fn validate(&self) -> Result<()> {
        if self.tools.jobs == 0 {
            return Err(BundleError::InvalidConfig(
                "tools.jobs must be at least 1".to_string(),
            ));
        }
        if self.catalog.extensions.is_empty() {
            return Err(BundleError::InvalidConfig(
                "catalog.extensions must not be empty".to_string(),
            ));
        }

        Regex::new(&self.catalog.pattern)?;

        let mut keys = std::collections::HashSet::new();
        for platform in &self.platforms {
            platform.matcher()?;
            if !keys.insert(platform.key.as_str()) {
                return Err(BundleError::InvalidConfig(format!(
                    "Duplicate platform key: {}",
                    platform.key
                )));
            }
        }

        Ok(())
    }

    pub fn catalog_matcher(&self) -> Result<Regex> {
        Ok(Regex::new(&self.catalog.pattern)?)
    }

    /// `owner/name`, for display
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.source.repo_owner, self.source.repo_name)
    }
}

/// Get the home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
