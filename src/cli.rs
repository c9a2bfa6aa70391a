use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "offline-builder")]
#[command(about = "Build self-contained offline collector bundles", long_about = None)]
#[command(version = env!("OFFLINE_BUILDER_VERSION"))]
#[command(after_help = "\
EXAMPLES:
  offline-builder build                       Bundle the latest release here
  offline-builder build --release 0.7.1 -o out
  offline-builder scan ./definitions --json   List tool references offline

For details about a specific command, use:
  offline-builder <command> --help")]
pub struct Cli {
    /// Show debug diagnostics on stderr
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a release and build its offline bundle
    #[command(long_about = "Resolve a release and build its offline bundle.\n\n\
        Downloads the platform binaries, the artifact catalog and every external\n\
        tool the catalog references into <OUTPUT>/<TAG>/, writes manifests, and\n\
        archives the tree as <OUTPUT>/offline_builder_v<TAG>.zip. Re-running\n\
        without --force reuses completed downloads.")]
    Build(BuildCmd),

    /// Scan artifact definitions for external tool URLs
    Scan(ScanCmd),

    /// Show the builder version
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct BuildCmd {
    /// Release to bundle (e.g. 0.7.1 or v0.7.1); defaults to the latest
    #[arg(short = 'r', long)]
    pub release: Option<String>,

    /// Directory that receives the workspace and archive
    #[arg(short = 'o', long, default_value = ".")]
    pub output: PathBuf,

    /// Discard an existing workspace for the release
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Stop after the manifests without writing the zip archive
    #[arg(long)]
    pub no_compress: bool,

    /// Concurrent tool downloads
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: Option<u16>,

    /// Release repository as owner/name
    #[arg(long, env = "OFFLINE_BUILDER_REPO", hide_env_values = true)]
    pub repo: Option<String>,

    /// Additional configuration file (highest file precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanCmd {
    /// Definitions directory or catalog .zip
    pub path: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Additional configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_build_defaults() {
        let cli = Cli::try_parse_from(["offline-builder", "build"]).unwrap();
        let Commands::Build(cmd) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(cmd.output, PathBuf::from("."));
        assert!(cmd.release.is_none());
        assert!(!cmd.force);
        assert!(!cmd.no_compress);
    }

    #[test]
    fn test_build_flags() {
        let cli = Cli::try_parse_from([
            "offline-builder",
            "-v",
            "build",
            "--release",
            "v0.7.1",
            "--output",
            "out",
            "--force",
            "--jobs",
            "8",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Build(cmd) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(cmd.release.as_deref(), Some("v0.7.1"));
        assert_eq!(cmd.output, PathBuf::from("out"));
        assert!(cmd.force);
        assert_eq!(cmd.jobs, Some(8));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        assert!(Cli::try_parse_from(["offline-builder", "build", "--jobs", "0"]).is_err());
    }

    #[test]
    fn test_scan_requires_path() {
        assert!(Cli::try_parse_from(["offline-builder", "scan"]).is_err());
        let cli = Cli::try_parse_from(["offline-builder", "scan", "defs", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan(ScanCmd { json: true, .. })));
    }
}
