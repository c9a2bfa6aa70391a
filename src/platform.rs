use crate::error::Result;
use crate::release::Asset;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A target operating system / architecture the bundle provisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSpec {
    /// Directory name under `binaries/`, e.g. `linux-amd64`.
    pub key: String,

    /// Regular expression matched against release asset names.
    pub pattern: String,

    /// Output file name; the asset name is kept when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default = "default_executable")]
    pub executable: bool,
}

fn default_executable() -> bool {
    true
}

impl PlatformSpec {
    pub fn new(key: &str, pattern: &str, file_name: &str, executable: bool) -> Self {
        Self {
            key: key.to_string(),
            pattern: pattern.to_string(),
            file_name: Some(file_name.to_string()),
            executable,
        }
    }

    pub fn matcher(&self) -> Result<Regex> {
        Ok(Regex::new(&self.pattern)?)
    }

    /// First asset, in release order, whose name matches this platform.
    pub fn select<'a>(&self, assets: &'a [Asset]) -> Result<Option<&'a Asset>> {
        let matcher = self.matcher()?;
        Ok(assets.iter().find(|asset| matcher.is_match(&asset.name)))
    }

    pub fn output_name<'a>(&'a self, asset: &'a Asset) -> &'a str {
        self.file_name.as_deref().unwrap_or(&asset.name)
    }
}

/// Windows, Linux and macOS builds of the collector on amd64.
pub fn default_platforms() -> Vec<PlatformSpec> {
    vec![
        PlatformSpec::new(
            "windows-amd64",
            r"windows-amd64\.exe$",
            "velociraptor.exe",
            false,
        ),
        PlatformSpec::new("linux-amd64", r"linux-amd64$", "velociraptor", true),
        PlatformSpec::new("darwin-amd64", r"darwin-amd64$", "velociraptor", true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str) -> Asset {
        Asset {
            name: name.to_string(),
            download_url: format!("https://example.com/{}", name),
            size: None,
        }
    }

    #[test]
    fn test_default_platforms() {
        let platforms = default_platforms();
        let keys: Vec<&str> = platforms.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["windows-amd64", "linux-amd64", "darwin-amd64"]);
        assert!(!platforms[0].executable);
        assert!(platforms[1].executable);
    }

    #[test]
    fn test_select_skips_musl_variant() {
        let assets = vec![
            asset("velociraptor-v0.7.1-linux-amd64-musl"),
            asset("velociraptor-v0.7.1-linux-amd64"),
        ];
        let linux = &default_platforms()[1];
        let selected = linux.select(&assets).unwrap().unwrap();
        assert_eq!(selected.name, "velociraptor-v0.7.1-linux-amd64");
    }

    #[test]
    fn test_select_returns_first_match() {
        let assets = vec![
            asset("velociraptor-v0.7.1-windows-amd64.exe"),
            asset("velociraptor-v0.7.1-rc1-windows-amd64.exe"),
        ];
        let windows = &default_platforms()[0];
        let selected = windows.select(&assets).unwrap().unwrap();
        assert_eq!(selected.name, "velociraptor-v0.7.1-windows-amd64.exe");
    }

    #[test]
    fn test_select_none_when_missing() {
        let assets = vec![asset("velociraptor-v0.7.1-linux-amd64")];
        let darwin = &default_platforms()[2];
        assert!(darwin.select(&assets).unwrap().is_none());
    }

    #[test]
    fn test_output_name_falls_back_to_asset_name() {
        let spec = PlatformSpec {
            key: "linux-arm64".to_string(),
            pattern: "linux-arm64$".to_string(),
            file_name: None,
            executable: true,
        };
        let a = asset("velociraptor-v0.7.1-linux-arm64");
        assert_eq!(spec.output_name(&a), "velociraptor-v0.7.1-linux-arm64");
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let spec = PlatformSpec::new("broken", "([", "x", true);
        assert!(spec.matcher().is_err());
    }
}
