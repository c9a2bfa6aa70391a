use crate::error::{BundleError, Result};
use crate::extract::{extract_archive, ArchiveFormat};
use crate::fetch::AssetFetcher;
use crate::report::{Reporter, Stage};
use crate::scanner::ToolSource;
use crate::utils::path::sanitize_component;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use url::Url;

pub const RECORD: &str = "tools";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Reused,
    Failed,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Ok => "ok",
            ToolStatus::Reused => "reused",
            ToolStatus::Failed => "failed",
        }
    }
}

/// Result of fetching one deduplicated tool URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAcquisition {
    pub url: String,
    pub definitions: Vec<String>,
    pub file_name: String,
    /// Downloaded file, relative to the workspace root.
    pub file: Option<String>,
    /// Extraction directory for archive tools, relative to the workspace root.
    pub extracted: Option<String>,
    pub size: u64,
    pub status: ToolStatus,
    pub error: Option<String>,
}

impl ToolAcquisition {
    pub fn succeeded(&self) -> bool {
        self.status != ToolStatus::Failed
    }
}

/// Last path segment of a URL, percent-decoded and sanitized.
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment).ok()?;
    let name = sanitize_component(&decoded);
    (name != "unnamed").then_some(name)
}

/// Where one tool lands inside `tools/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPlan {
    pub file_name: String,
    /// Archive downloads are unpacked into `<owner>/<stem>`.
    pub extract: Option<(ArchiveFormat, String)>,
}

/// First of `base`, `<n>-base`, ... that `used` does not contain yet.
fn claim(used: &mut HashSet<String>, base: &str, first: usize, step: usize) -> String {
    let mut candidate = base.to_string();
    let mut n = first;
    while used.contains(&candidate) {
        candidate = format!("{}-{}", n, base);
        n += step;
    }
    used.insert(candidate.clone());
    candidate
}

/// Choose a distinct file name for every source, in order.
///
/// Sources are sorted by URL, so the assignment is deterministic. URLs without
/// a usable segment become `tool-<n>.bin`; repeated names get an `<n>-` prefix.
pub fn plan_file_names(sources: &[ToolSource]) -> Vec<String> {
    let mut used = HashSet::new();
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let base = url_file_name(&source.url).unwrap_or_else(|| format!("tool-{}.bin", i + 1));
            claim(&mut used, &base, i + 1, sources.len())
        })
        .collect()
}

/// File names plus extraction directories, both distinct across all sources,
/// so no two workers ever write to the same path.
pub fn plan_tools(sources: &[ToolSource], archive_extensions: &[String]) -> Vec<ToolPlan> {
    let mut stems: HashMap<String, HashSet<String>> = HashMap::new();
    plan_file_names(sources)
        .into_iter()
        .zip(sources)
        .enumerate()
        .map(|(i, (file_name, source))| {
            let extract = ArchiveFormat::detect(&file_name, archive_extensions).map(|format| {
                let owner = sanitize_component(source.primary());
                let stem = sanitize_component(format.stem(&file_name));
                let taken = stems.entry(owner.clone()).or_default();
                let stem = claim(taken, &stem, i + 1, sources.len());
                (format, format!("{}/{}", owner, stem))
            });
            ToolPlan { file_name, extract }
        })
        .collect()
}

/// Fetch every tool into `tools/`, unpacking archives into
/// `tools/<owner>/<archive-stem>/`.
///
/// Up to `jobs` downloads run at once. Individual failures become `Failed`
/// records; only cancellation fails the stage. The result is sorted by URL.
pub fn acquire_tools(
    sources: &[ToolSource],
    workspace: &Workspace,
    fetcher: &AssetFetcher<'_>,
    archive_extensions: &[String],
    jobs: usize,
    reporter: &Reporter,
) -> Result<Vec<ToolAcquisition>> {
    let plans = plan_tools(sources, archive_extensions);
    let next = AtomicUsize::new(0);
    let workers = jobs.clamp(1, sources.len().max(1));
    let bar = reporter.progress(sources.len() as u64);

    let mut results: Vec<Result<ToolAcquisition>> = Vec::with_capacity(sources.len());
    std::thread::scope(|scope| {
        let (tx, rx) = mpsc::channel();
        for _ in 0..workers {
            let tx = tx.clone();
            let (next, plans) = (&next, &plans);
            scope.spawn(move || loop {
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= sources.len() {
                    break;
                }
                let result = acquire_one(&sources[i], &plans[i], workspace, fetcher, reporter);
                let cancelled = matches!(result, Err(BundleError::Cancelled));
                if tx.send(result).is_err() || cancelled {
                    break;
                }
            });
        }
        drop(tx);

        for result in rx {
            if let Ok(acquisition) = &result {
                bar.set_message(acquisition.file_name.clone());
            }
            bar.inc(1);
            results.push(result);
        }
    });
    bar.finish_and_clear();

    let mut acquisitions = results.into_iter().collect::<Result<Vec<_>>>()?;
    acquisitions.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(acquisitions)
}

fn acquire_one(
    source: &ToolSource,
    plan: &ToolPlan,
    workspace: &Workspace,
    fetcher: &AssetFetcher<'_>,
    reporter: &Reporter,
) -> Result<ToolAcquisition> {
    let file_name = plan.file_name.as_str();
    let mut record = ToolAcquisition {
        url: source.url.clone(),
        definitions: source.definitions.clone(),
        file_name: file_name.to_string(),
        file: None,
        extracted: None,
        size: 0,
        status: ToolStatus::Failed,
        error: None,
    };

    let dest = workspace.tools_dir().join(file_name);
    let fetched = match fetcher.fetch(&source.url, &dest) {
        Ok(fetched) => fetched,
        Err(BundleError::Cancelled) => return Err(BundleError::Cancelled),
        Err(e) => {
            reporter.warn(Stage::Tools, &source.url, e.to_string());
            record.error = Some(e.to_string());
            return Ok(record);
        }
    };
    record.file = Some(workspace.relative(&fetched.path));
    record.size = fetched.size;

    if let Some((format, dir)) = &plan.extract {
        let target = workspace.tools_dir().join(dir);
        match extract_archive(&fetched.path, &target, *format) {
            Ok(_) => record.extracted = Some(workspace.relative(&target)),
            Err(e) => {
                reporter.warn(Stage::Tools, &source.url, e.to_string());
                record.error = Some(e.to_string());
                return Ok(record);
            }
        }
    }

    record.status = if fetched.reused {
        ToolStatus::Reused
    } else {
        ToolStatus::Ok
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::fetch::testing::MapTransport;
    use std::io::Write;
    use tempfile::TempDir;

    fn source(url: &str, defs: &[&str]) -> ToolSource {
        ToolSource {
            url: url.to_string(),
            definitions: defs.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn archive_exts() -> Vec<String> {
        vec![".zip".to_string(), ".tar.gz".to_string(), ".tgz".to_string()]
    }

    fn tool_zip() -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            zip.start_file("hayabusa.exe", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"MZ").unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    fn tool_tgz(name: &str) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut header = tar::Header::new_gnu();
        header.set_size(3);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, &b"ELF"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_url_file_name() {
        assert_eq!(
            url_file_name("https://live.sysinternals.com/tools/autorunsc64.exe"),
            Some("autorunsc64.exe".to_string())
        );
        assert_eq!(
            url_file_name("https://example.com/dl/tool.zip?token=abc#frag"),
            Some("tool.zip".to_string())
        );
        assert_eq!(url_file_name("https://example.com/"), None);
        assert_eq!(url_file_name("https://example.com"), None);
        assert_eq!(url_file_name("https://example.com/dir/"), None);
        assert_eq!(url_file_name("not a url"), None);
    }

    #[test]
    fn test_url_file_name_is_percent_decoded() {
        assert_eq!(
            url_file_name("https://a.example/My%20Tool.exe"),
            Some("My_Tool.exe".to_string())
        );
        assert_eq!(
            url_file_name("https://a.example/dl/%2e%2e"),
            None,
            "decoded dot segments must not become a path"
        );
    }

    #[test]
    fn test_plan_file_names_unique() {
        let sources = vec![
            source("https://a.example/v1/tool.exe", &["A"]),
            source("https://a.example/v2/tool.exe", &["B"]),
            source("https://b.example/", &["C"]),
            source("https://c.example/other.exe", &["D"]),
        ];
        let names = plan_file_names(&sources);
        assert_eq!(names, vec!["tool.exe", "2-tool.exe", "tool-3.bin", "other.exe"]);
    }

    #[test]
    fn test_plan_tools_separates_same_stem_archives() {
        let sources = vec![
            source("https://a.example/linux/tool.tgz", &["Def"]),
            source("https://a.example/plain/tool.exe", &["Def"]),
            source("https://a.example/win/tool.zip", &["Def"]),
            source("https://b.example/tool.zip", &["Other"]),
        ];
        let plans = plan_tools(&sources, &archive_exts());

        assert_eq!(plans[0].extract, Some((ArchiveFormat::TarGz, "Def/tool".to_string())));
        assert_eq!(plans[1].extract, None);
        assert_eq!(plans[2].extract, Some((ArchiveFormat::Zip, "Def/3-tool".to_string())));
        assert_eq!(plans[3].file_name, "4-tool.zip");
        assert_eq!(plans[3].extract, Some((ArchiveFormat::Zip, "Other/4-tool".to_string())));
    }

    #[test]
    fn test_same_stem_archives_extract_apart() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::prepare(dir.path(), "9.9.9", false).unwrap();
        let transport = MapTransport::default()
            .with("https://a.example/linux/tool.tgz", &tool_tgz("linux-tool"))
            .with("https://a.example/win/tool.zip", &tool_zip());
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let sources = vec![
            source("https://a.example/linux/tool.tgz", &["Def"]),
            source("https://a.example/win/tool.zip", &["Def"]),
        ];
        let results =
            acquire_tools(&sources, &ws, &fetcher, &archive_exts(), 2, &Reporter::quiet()).unwrap();

        assert!(results.iter().all(|r| r.status == ToolStatus::Ok));
        assert_eq!(results[0].extracted.as_deref(), Some("tools/Def/tool"));
        assert_eq!(results[1].extracted.as_deref(), Some("tools/Def/2-tool"));

        let entries = |sub: &str| -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(ws.tools_dir().join(sub))
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        };
        assert_eq!(entries("Def/tool"), vec!["linux-tool"]);
        assert_eq!(entries("Def/2-tool"), vec!["hayabusa.exe"]);
    }

    #[test]
    fn test_acquire_flat_and_archive_tools() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::prepare(dir.path(), "9.9.9", false).unwrap();
        let transport = MapTransport::default()
            .with("https://a.example/autorunsc64.exe", b"MZ")
            .with("https://a.example/hayabusa.zip", &tool_zip());
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let sources = vec![
            source("https://a.example/autorunsc64.exe", &["Windows.Sysinternals.Autoruns"]),
            source("https://a.example/hayabusa.zip", &["Windows.EventLogs.Hayabusa"]),
        ];
        let results =
            acquire_tools(&sources, &ws, &fetcher, &archive_exts(), 2, &Reporter::quiet()).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == ToolStatus::Ok));
        assert_eq!(results[0].extracted, None);
        assert_eq!(
            results[1].extracted.as_deref(),
            Some("tools/Windows.EventLogs.Hayabusa/hayabusa")
        );
        assert!(ws
            .tools_dir()
            .join("Windows.EventLogs.Hayabusa/hayabusa/hayabusa.exe")
            .is_file());
        assert!(ws.tools_dir().join("autorunsc64.exe").is_file());
    }

    #[test]
    fn test_failures_do_not_abort_remaining_tools() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::prepare(dir.path(), "9.9.9", false).unwrap();
        let transport = MapTransport::default().with("https://a.example/good.exe", b"MZ");
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);
        let reporter = Reporter::quiet();

        let sources = vec![
            source("https://a.example/good.exe", &["Good"]),
            source("https://a.example/missing.exe", &["Missing"]),
        ];
        let results = acquire_tools(&sources, &ws, &fetcher, &archive_exts(), 4, &reporter).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, ToolStatus::Ok);
        assert_eq!(results[1].status, ToolStatus::Failed);
        assert!(results[1].error.as_deref().unwrap().contains("404"));
        assert!(!ws.tools_dir().join("missing.exe").exists());
        assert_eq!(reporter.warnings()[0].subject, "https://a.example/missing.exe");
    }

    #[test]
    fn test_corrupt_archive_recorded_as_failed() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::prepare(dir.path(), "9.9.9", false).unwrap();
        let transport = MapTransport::default().with("https://a.example/broken.zip", b"not a zip");
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let sources = vec![source("https://a.example/broken.zip", &["Broken"])];
        let results =
            acquire_tools(&sources, &ws, &fetcher, &archive_exts(), 1, &Reporter::quiet()).unwrap();

        assert_eq!(results[0].status, ToolStatus::Failed);
        assert_eq!(results[0].file.as_deref(), Some("tools/broken.zip"));
        assert!(results[0].extracted.is_none());
    }

    #[test]
    fn test_results_sorted_by_url_regardless_of_workers() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::prepare(dir.path(), "9.9.9", false).unwrap();
        let mut transport = MapTransport::default();
        let mut sources = Vec::new();
        for i in 0..12 {
            let url = format!("https://a.example/t{:02}.exe", i);
            transport = transport.with(&url, b"MZ");
            sources.push(source(&url, &["Def"]));
        }
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let results =
            acquire_tools(&sources, &ws, &fetcher, &archive_exts(), 5, &Reporter::quiet()).unwrap();
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        let expected: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, expected);
        assert_eq!(transport.request_count(), 12);
    }

    #[test]
    fn test_cancellation_fails_the_stage() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::prepare(dir.path(), "9.9.9", false).unwrap();
        let transport = MapTransport::default().with("https://a.example/x.exe", b"MZ");
        let cancel = CancelToken::new();
        cancel.cancel();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let sources = vec![source("https://a.example/x.exe", &["X"])];
        let result = acquire_tools(&sources, &ws, &fetcher, &archive_exts(), 1, &Reporter::quiet());
        assert!(matches!(result, Err(BundleError::Cancelled)));
    }

    #[test]
    fn test_empty_source_list() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::prepare(dir.path(), "9.9.9", false).unwrap();
        let transport = MapTransport::default();
        let cancel = CancelToken::new();
        let fetcher = AssetFetcher::new(&transport, &cancel);

        let results = acquire_tools(&[], &ws, &fetcher, &archive_exts(), 4, &Reporter::quiet()).unwrap();
        assert!(results.is_empty());
    }
}
