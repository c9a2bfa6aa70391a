// Compile-time constants from Cargo.toml and build.rs
pub const VERSION: &str = env!("OFFLINE_BUILDER_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// User agent sent with every transfer.
pub fn user_agent() -> String {
    format!("{}/{}", PKG_NAME, VERSION)
}

/// Host operating system and architecture, as recorded in the environment summary.
pub fn host_platform() -> (&'static str, &'static str) {
    (std::env::consts::OS, std::env::consts::ARCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(PKG_NAME, "offline-builder");
    }

    #[test]
    fn test_user_agent_format() {
        let agent = user_agent();
        assert!(agent.starts_with("offline-builder/"));
        assert!(agent.ends_with(VERSION));
    }

    #[test]
    fn test_version_is_valid_semver_with_metadata() {
        // Dev builds look like "0.3.0-dev+a1b2c3d4[.dirty]", which semver accepts as-is.
        assert!(
            Version::parse(VERSION).is_ok(),
            "Version should be valid semver: {}",
            VERSION
        );
    }

    #[test]
    fn test_host_platform_is_known() {
        let (os, arch) = host_platform();
        assert!(!os.is_empty());
        assert!(!arch.is_empty());
    }
}
