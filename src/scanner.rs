//! Tool reference discovery.
//!
//! Definition files are read line by line with exactly two pieces of state:
//! the current definition name and the references collected so far. A
//! top-level `name:` line replaces the current name; every `url:` line, at any
//! depth, is attributed to whichever name came last in the same file. No
//! structural YAML parsing happens, so a URL nested under a sub-structure
//! still belongs to the nearest preceding top-level name.

use crate::error::{BundleError, Result};
use crate::report::{Reporter, Stage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

pub const RECORD: &str = "tool_references";

fn name_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^name:\s*(.*?)\s*$").expect("valid name pattern"))
}

fn url_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:-\s+)?url:\s*(.*?)\s*$").expect("valid url pattern"))
}

fn has_scheme() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://\S+$").expect("valid scheme pattern"))
}

/// One `url:` occurrence and the definition it was attributed to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolReference {
    pub definition: String,
    pub url: String,
}

/// A deduplicated tool URL with every definition that references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSource {
    pub url: String,
    /// Sorted, never empty.
    pub definitions: Vec<String>,
}

impl ToolSource {
    /// Owner used for naming: the lexicographically smallest definition.
    pub fn primary(&self) -> &str {
        self.definitions.first().map(String::as_str).unwrap_or("unnamed")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Definition files read successfully.
    pub definitions: usize,
    /// References found before deduplication.
    pub references: usize,
    pub sources: Vec<ToolSource>,
    pub failed: Vec<ParseFailure>,
}

struct LineScanner {
    current: String,
    found: Vec<ToolReference>,
}

impl LineScanner {
    fn new(fallback_name: &str) -> Self {
        Self {
            current: fallback_name.to_string(),
            found: Vec::new(),
        }
    }

    fn feed(&mut self, line: &str) {
        if let Some(caps) = name_line().captures(line) {
            let name = unquote(&caps[1]);
            if !name.is_empty() {
                self.current = name.to_string();
            }
            return;
        }

        if let Some(caps) = url_line().captures(line) {
            let url = unquote(&caps[1]);
            if has_scheme().is_match(url) {
                self.found.push(ToolReference {
                    definition: self.current.clone(),
                    url: url.to_string(),
                });
            }
        }
    }
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    value
}

/// Scan one document. URLs that precede any name line belong to `fallback_name`.
pub fn scan_text(text: &str, fallback_name: &str) -> Vec<ToolReference> {
    let mut scanner = LineScanner::new(fallback_name);
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    for line in text.lines() {
        scanner.feed(line);
    }
    scanner.found
}

pub fn scan_file(path: &Path) -> Result<Vec<ToolReference>> {
    let fail = |cause: String| BundleError::DefinitionParseFailed {
        file: path.to_path_buf(),
        cause,
    };
    let bytes = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| fail(e.to_string()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed");
    Ok(scan_text(&text, stem))
}

/// Definition files under `root`, recursively, in a stable order.
pub fn definition_files(root: &Path, extensions: &[String]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        })
        .collect()
}

/// Collapse references to one entry per URL, sorted by URL, keeping every
/// owning definition name. The result does not depend on input order.
pub fn dedup(references: impl IntoIterator<Item = ToolReference>) -> Vec<ToolSource> {
    let mut by_url: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for reference in references {
        by_url
            .entry(reference.url)
            .or_default()
            .insert(reference.definition);
    }
    by_url
        .into_iter()
        .map(|(url, definitions)| ToolSource {
            url,
            definitions: definitions.into_iter().collect(),
        })
        .collect()
}

/// Scan every definition file under `root`. Unreadable files are reported and
/// skipped; the scan itself never fails.
pub fn scan_definitions(root: &Path, extensions: &[String], reporter: &Reporter) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut references = Vec::new();

    for path in definition_files(root, extensions) {
        match scan_file(&path) {
            Ok(found) => {
                outcome.definitions += 1;
                references.extend(found);
            }
            Err(e) => {
                let file = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .display()
                    .to_string();
                reporter.warn(Stage::Scan, &file, e.to_string());
                outcome.failed.push(ParseFailure {
                    file,
                    error: e.to_string(),
                });
            }
        }
    }

    outcome.references = references.len();
    outcome.sources = dedup(references);
    outcome
}
