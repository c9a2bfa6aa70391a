//! Runs the stages in order. Each stage persists its record in the workspace
//! and the next one reads it back, so any stage can be re-run against a
//! workspace left by an earlier run.

use crate::acquire::{self, binaries, catalog, tools, BinaryOutcome, CatalogOutcome};
use crate::archive::{archive_bundle, ArchiveOutcome};
use crate::cancel::CancelToken;
use crate::config::BuilderConfig;
use crate::error::Result;
use crate::fetch::{AssetFetcher, Transport};
use crate::manifest::{self, BundleSummary, RunRecord, RUN_RECORD};
use crate::release::{self, ReleaseSource};
use crate::report::Reporter;
use crate::scanner::{self, ScanOutcome};
use crate::workspace::Workspace;
use chrono::Utc;
use std::path::PathBuf;

/// Per-run options from the command line.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory holding `<tag>/` and the final archive.
    pub output: PathBuf,
    /// `None` or `latest` for the newest release.
    pub release: Option<String>,
    /// Discard an existing workspace for the same release.
    pub force: bool,
    /// Produce the final zip; without it the run ends after the manifests.
    pub compress: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("."),
            release: None,
            force: false,
            compress: true,
        }
    }
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub release: String,
    pub workspace: PathBuf,
    pub archive: Option<ArchiveOutcome>,
    pub summary: BundleSummary,
}

pub fn run(
    config: &BuilderConfig,
    options: &BuildOptions,
    source: &dyn ReleaseSource,
    transport: &dyn Transport,
    cancel: &CancelToken,
    reporter: &Reporter,
) -> Result<BuildOutcome> {
    config.validate()?;
    let started_at = Utc::now();
    let requested = release::parse_release_arg(options.release.as_deref())?;

    // Nothing is written to disk until a release has been resolved.
    reporter.stage(format!(
        "Resolving {} release of {}",
        requested.as_deref().unwrap_or("latest"),
        config.repo_slug()
    ));
    let resolved = release::resolve(source, requested.as_deref())?;
    reporter.success(format!(
        "Release {} ({} assets)",
        resolved.tag,
        resolved.assets.len()
    ));
    cancel.check()?;

    let workspace = Workspace::prepare(&options.output, &resolved.tag, options.force)?;
    tracing::info!(root = %workspace.root().display(), "Workspace ready");
    workspace.write_config(config)?;
    workspace.save_record(RUN_RECORD, &RunRecord::new(resolved, started_at))?;

    let fetcher = AssetFetcher::new(transport, cancel);

    reporter.stage("Downloading binaries");
    run_binaries(config, &workspace, &fetcher, reporter)?;
    cancel.check()?;

    reporter.stage("Downloading artifact catalog");
    run_catalog(config, &workspace, &fetcher, reporter)?;
    cancel.check()?;

    reporter.stage("Scanning definitions for tool references");
    run_scan(config, &workspace, reporter)?;
    cancel.check()?;

    reporter.stage("Downloading external tools");
    run_tools(config, &workspace, &fetcher, reporter)?;
    cancel.check()?;

    reporter.stage("Writing manifests");
    let manifested = manifest::build_manifests(&workspace, Utc::now())?;
    cancel.check()?;

    let archive = if options.compress {
        reporter.stage("Creating archive");
        let archive = archive_bundle(&manifested)?;
        reporter.success(format!(
            "{} ({} files, {} bytes)",
            archive.path.display(),
            archive.entries,
            archive.size
        ));
        Some(archive)
    } else {
        tracing::info!("Compression skipped");
        None
    };

    Ok(BuildOutcome {
        release: workspace.tag().to_string(),
        workspace: workspace.root(),
        archive,
        summary: manifested.summary,
    })
}

fn run_binaries(
    config: &BuilderConfig,
    workspace: &Workspace,
    fetcher: &AssetFetcher<'_>,
    reporter: &Reporter,
) -> Result<()> {
    let release: RunRecord = workspace.load_record(RUN_RECORD)?;
    let outcome: BinaryOutcome = acquire::acquire_binaries(
        &release.release,
        &config.platforms,
        workspace,
        fetcher,
        reporter,
    )?;
    reporter.success(format!(
        "{} binaries, {} skipped, {} failed",
        outcome.acquired.len(),
        outcome.skipped.len(),
        outcome.failed.len()
    ));
    workspace.save_record(binaries::RECORD, &outcome)
}

fn run_catalog(
    config: &BuilderConfig,
    workspace: &Workspace,
    fetcher: &AssetFetcher<'_>,
    reporter: &Reporter,
) -> Result<()> {
    let release: RunRecord = workspace.load_record(RUN_RECORD)?;
    let pattern = config.catalog_matcher()?;
    let outcome: CatalogOutcome =
        acquire::acquire_catalog(&release.release, &pattern, workspace, fetcher, reporter)?;
    if let Some(asset) = &outcome.asset {
        reporter.success(format!("{} ({} files)", asset, outcome.files));
    }
    workspace.save_record(catalog::RECORD, &outcome)
}

fn run_scan(config: &BuilderConfig, workspace: &Workspace, reporter: &Reporter) -> Result<()> {
    let outcome: ScanOutcome =
        scanner::scan_definitions(&workspace.definitions_dir(), &config.catalog.extensions, reporter);
    reporter.success(format!(
        "{} definitions, {} references, {} unique tools",
        outcome.definitions,
        outcome.references,
        outcome.sources.len()
    ));
    workspace.save_record(scanner::RECORD, &outcome)
}

fn run_tools(
    config: &BuilderConfig,
    workspace: &Workspace,
    fetcher: &AssetFetcher<'_>,
    reporter: &Reporter,
) -> Result<()> {
    let scan: ScanOutcome = workspace.load_record(scanner::RECORD)?;
    let results = acquire::acquire_tools(
        &scan.sources,
        workspace,
        fetcher,
        &config.tools.archive_extensions,
        config.tools.jobs,
        reporter,
    )?;
    let ok = results.iter().filter(|r| r.succeeded()).count();
    reporter.success(format!("{} tools acquired, {} failed", ok, results.len() - ok));
    workspace.save_record(tools::RECORD, &results)
}
