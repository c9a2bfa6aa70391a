//! Manifest Builder.
//!
//! Reads the stage records persisted under `config/` and writes the bundle's
//! manifests. Everything except the timestamp fields is a pure function of
//! those records and the workspace contents, so rebuilding manifests for a
//! finished workspace reproduces them.

use crate::acquire::{binaries, catalog, tools, BinaryOutcome, CatalogOutcome, ToolAcquisition};
use crate::error::Result;
use crate::release::Release;
use crate::report::{Stage, Warning};
use crate::scanner::{self, ScanOutcome};
use crate::version;
use crate::workspace::{
    Workspace, BINARIES_MANIFEST, ENVIRONMENT_INFO, SUMMARY, TOOL_MANIFEST,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use url::Url;

pub const RUN_RECORD: &str = "run";

/// Written when a run starts; the manifests' release and start time come from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub release: Release,
    pub started_at: String,
    pub builder_version: String,
}

impl RunRecord {
    pub fn new(release: Release, started_at: DateTime<Utc>) -> Self {
        Self {
            release,
            started_at: timestamp(started_at),
            builder_version: version::VERSION.to_string(),
        }
    }
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Counts for the end-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleSummary {
    pub release: String,
    pub binaries: usize,
    pub skipped_platforms: Vec<String>,
    pub definitions: usize,
    pub tools_ok: usize,
    pub tools_failed: usize,
    pub total_bytes: u64,
    pub issues: Vec<Warning>,
}

/// Proof that the manifest stage completed for a workspace; the archiver
/// only accepts this.
#[derive(Debug)]
pub struct Manifested<'a> {
    workspace: &'a Workspace,
    pub summary: BundleSummary,
}

impl<'a> Manifested<'a> {
    pub fn workspace(&self) -> &'a Workspace {
        self.workspace
    }
}

#[derive(Debug, Serialize)]
struct BinariesManifest<'a> {
    release: &'a str,
    generated_at: &'a str,
    binaries: &'a [binaries::AcquiredBinary],
    failed: &'a [binaries::FailedBinary],
    skipped_platforms: &'a [String],
}

#[derive(Debug, Serialize)]
struct HostInfo {
    os: &'static str,
    arch: &'static str,
}

#[derive(Debug, Serialize)]
struct EnvironmentInfo<'a> {
    release: &'a str,
    builder_version: &'a str,
    started_at: &'a str,
    generated_at: &'a str,
    host: HostInfo,
    catalog: Option<&'a str>,
    binaries: usize,
    definitions: usize,
    definition_parse_failures: usize,
    tool_references: usize,
    tools_ok: usize,
    tools_failed: usize,
    total_bytes: u64,
    tool_hosts: BTreeMap<String, usize>,
    repositories: BTreeMap<String, BTreeSet<String>>,
    organizations: BTreeSet<String>,
    warnings: &'a [Warning],
}

/// Build all manifests from the records on disk.
pub fn build_manifests(workspace: &Workspace, now: DateTime<Utc>) -> Result<Manifested<'_>> {
    let run: RunRecord = workspace.load_record(RUN_RECORD)?;
    let mut bins: BinaryOutcome = workspace.load_record(binaries::RECORD)?;
    let catalog: CatalogOutcome = workspace.load_record(catalog::RECORD)?;
    let scan: ScanOutcome = workspace.load_record(scanner::RECORD)?;
    let mut tools: Vec<ToolAcquisition> = workspace.load_record(tools::RECORD)?;

    bins.acquired.sort_by(|a, b| a.platform.cmp(&b.platform));
    bins.failed.sort_by(|a, b| a.platform.cmp(&b.platform));
    bins.skipped.sort();
    tools.sort_by(|a, b| a.url.cmp(&b.url));

    let generated_at = timestamp(now);
    let issues = collect_issues(&bins, &catalog, &scan, &tools);
    let total_bytes = workspace.total_size();
    let tools_ok = tools.iter().filter(|t| t.succeeded()).count();

    let summary = BundleSummary {
        release: run.release.tag.clone(),
        binaries: bins.acquired.len(),
        skipped_platforms: bins.skipped.clone(),
        definitions: scan.definitions,
        tools_ok,
        tools_failed: tools.len() - tools_ok,
        total_bytes,
        issues,
    };

    fs::write(workspace.manifest_path(TOOL_MANIFEST), tool_manifest_csv(&tools))?;

    let binaries_manifest = BinariesManifest {
        release: &run.release.tag,
        generated_at: &generated_at,
        binaries: &bins.acquired,
        failed: &bins.failed,
        skipped_platforms: &bins.skipped,
    };
    write_json(workspace, BINARIES_MANIFEST, &binaries_manifest)?;

    let repos = repositories(&tools);
    let (os, arch) = version::host_platform();
    let environment = EnvironmentInfo {
        release: &run.release.tag,
        builder_version: &run.builder_version,
        started_at: &run.started_at,
        generated_at: &generated_at,
        host: HostInfo { os, arch },
        catalog: catalog.asset.as_deref(),
        binaries: summary.binaries,
        definitions: summary.definitions,
        definition_parse_failures: scan.failed.len(),
        tool_references: scan.references,
        tools_ok: summary.tools_ok,
        tools_failed: summary.tools_failed,
        total_bytes,
        tool_hosts: tool_hosts(&tools),
        organizations: repos
            .keys()
            .filter_map(|r| r.split_once('/').map(|(owner, _)| owner.to_string()))
            .collect(),
        repositories: repos,
        warnings: &summary.issues,
    };
    write_json(workspace, ENVIRONMENT_INFO, &environment)?;

    fs::write(
        workspace.manifest_path(SUMMARY),
        summary_markdown(&summary, &bins, &tools, &generated_at),
    )?;

    Ok(Manifested { workspace, summary })
}

fn write_json<T: Serialize>(workspace: &Workspace, name: &str, value: &T) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(value)?;
    contents.push('\n');
    fs::write(workspace.manifest_path(name), contents)?;
    Ok(())
}

fn collect_issues(
    bins: &BinaryOutcome,
    catalog: &CatalogOutcome,
    scan: &ScanOutcome,
    tools: &[ToolAcquisition],
) -> Vec<Warning> {
    let mut issues = Vec::new();
    for key in &bins.skipped {
        issues.push(Warning {
            stage: Stage::Binaries,
            subject: key.clone(),
            message: "no matching release asset".to_string(),
        });
    }
    for bin in bins.acquired.iter().filter(|b| b.size_mismatch()) {
        issues.push(Warning {
            stage: Stage::Binaries,
            subject: bin.platform.clone(),
            message: format!(
                "{} bytes on disk, release lists {}",
                bin.size,
                bin.expected_size.unwrap_or_default()
            ),
        });
    }
    for failed in &bins.failed {
        issues.push(Warning {
            stage: Stage::Binaries,
            subject: failed.platform.clone(),
            message: failed.error.clone(),
        });
    }
    if catalog.asset.is_none() {
        issues.push(Warning {
            stage: Stage::Catalog,
            subject: "catalog".to_string(),
            message: "release has no artifact catalog".to_string(),
        });
    }
    for failed in &scan.failed {
        issues.push(Warning {
            stage: Stage::Scan,
            subject: failed.file.clone(),
            message: failed.error.clone(),
        });
    }
    for tool in tools.iter().filter(|t| !t.succeeded()) {
        issues.push(Warning {
            stage: Stage::Tools,
            subject: tool.url.clone(),
            message: tool.error.clone().unwrap_or_default(),
        });
    }
    issues
}

/// `definition,url,file_name,extracted_path,status,error`, one row per tool.
pub fn tool_manifest_csv(tools: &[ToolAcquisition]) -> String {
    let mut out = String::from("definition,url,file_name,extracted_path,status,error\n");
    for tool in tools {
        let fields = [
            tool.definitions.join(";"),
            tool.url.clone(),
            tool.file_name.clone(),
            tool.extracted.clone().unwrap_or_default(),
            tool.status.as_str().to_string(),
            tool.error.clone().unwrap_or_default(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn url_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(str::to_ascii_lowercase)
}

fn tool_hosts(tools: &[ToolAcquisition]) -> BTreeMap<String, usize> {
    let mut hosts = BTreeMap::new();
    for host in tools.iter().filter_map(|t| url_host(&t.url)) {
        *hosts.entry(host).or_insert(0) += 1;
    }
    hosts
}

const GITHUB_HOSTS: &[&str] = &["github.com", "www.github.com", "raw.githubusercontent.com"];

/// `owner/repo` for URLs served from GitHub repositories.
fn github_repository(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    if !GITHUB_HOSTS.contains(&host.as_str()) {
        return None;
    }
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    Some(format!("{}/{}", owner, repo))
}

/// GitHub repositories referenced by tool URLs, with the definitions that
/// reference each one.
fn repositories(tools: &[ToolAcquisition]) -> BTreeMap<String, BTreeSet<String>> {
    let mut repos: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for tool in tools {
        if let Some(repo) = github_repository(&tool.url) {
            repos
                .entry(repo)
                .or_default()
                .extend(tool.definitions.iter().cloned());
        }
    }
    repos
}

fn summary_markdown(
    summary: &BundleSummary,
    bins: &BinaryOutcome,
    tools: &[ToolAcquisition],
    generated_at: &str,
) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Offline bundle {}\n", summary.release);
    let _ = writeln!(md, "Generated {}\n", generated_at);
    let _ = writeln!(md, "- Binaries: {}", summary.binaries);
    let _ = writeln!(md, "- Definitions: {}", summary.definitions);
    let _ = writeln!(
        md,
        "- Tools: {} acquired, {} failed",
        summary.tools_ok, summary.tools_failed
    );
    let _ = writeln!(md, "- Size: {} bytes\n", summary.total_bytes);

    let _ = writeln!(md, "## Binaries\n");
    for bin in &bins.acquired {
        let _ = writeln!(md, "- `{}`: {} ({} bytes)", bin.platform, bin.file, bin.size);
    }
    for key in &bins.skipped {
        let _ = writeln!(md, "- `{}`: skipped", key);
    }

    let _ = writeln!(md, "\n## Tools\n");
    for tool in tools {
        let _ = writeln!(
            md,
            "- [{}] {} ({})",
            tool.status.as_str(),
            tool.url,
            tool.definitions.join(", ")
        );
    }

    if !summary.issues.is_empty() {
        let _ = writeln!(md, "\n## Warnings\n");
        for issue in &summary.issues {
            let _ = writeln!(md, "- {}: {}: {}", issue.stage, issue.subject, issue.message);
        }
    }
    md
}
