use crate::cli::ScanCmd;
use crate::config::BuilderConfig;
use crate::error::{BundleError, Result};
use crate::extract::{extract_archive, ArchiveFormat};
use crate::report::Reporter;
use crate::scanner::{scan_definitions, ScanOutcome};
use std::path::Path;

pub fn execute(cmd: &ScanCmd) -> Result<()> {
    let config = BuilderConfig::load(Path::new("."), cmd.config.as_deref())?;
    // JSON output stays machine-readable; failures are in the document.
    let reporter = if cmd.json {
        Reporter::quiet()
    } else {
        Reporter::new()
    };

    let outcome = scan_path(&cmd.path, &config.catalog.extensions, &reporter)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_table(&outcome);
    reporter.finish(format!(
        "Scanned {} definitions, found {} unique tools",
        outcome.definitions,
        outcome.sources.len()
    ));
    Ok(())
}

/// Scan a definitions directory, or a catalog archive unpacked into a
/// temporary directory.
pub fn scan_path(path: &Path, extensions: &[String], reporter: &Reporter) -> Result<ScanOutcome> {
    if path.is_dir() {
        return Ok(scan_definitions(path, extensions, reporter));
    }

    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    match ArchiveFormat::from_name(&name) {
        Some(format) if path.is_file() => {
            let scratch = tempfile::TempDir::new()?;
            let files = extract_archive(path, scratch.path(), format)?;
            tracing::debug!(archive = %path.display(), files, "Catalog unpacked for scanning");
            Ok(scan_definitions(scratch.path(), extensions, reporter))
        }
        _ => Err(BundleError::InvalidConfig(format!(
            "{} is neither a directory nor a catalog archive",
            path.display()
        ))),
    }
}

fn print_table(outcome: &ScanOutcome) {
    if outcome.sources.is_empty() {
        println!("No external tool references found.");
        return;
    }

    let width = outcome
        .sources
        .iter()
        .map(|s| s.primary().len())
        .max()
        .unwrap_or(0)
        .max("DEFINITION".len());

    println!("{:<width$}  URL", "DEFINITION", width = width);
    for source in &outcome.sources {
        println!("{:<width$}  {}", source.primary(), source.url, width = width);
        for other in source.definitions.iter().skip(1) {
            println!("{:<width$}  (also)", other, width = width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn extensions() -> Vec<String> {
        vec!["yaml".to_string(), "yml".to_string()]
    }

    const DEFINITION: &str = "name: Windows.Sysinternals.Autoruns\ntools:\n  - name: Autorun_amd64\n    url: https://live.sysinternals.com/tools/autorunsc64.exe\n";

    #[test]
    fn test_scan_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Autoruns.yaml"), DEFINITION).unwrap();

        let outcome = scan_path(dir.path(), &extensions(), &Reporter::quiet()).unwrap();
        assert_eq!(outcome.definitions, 1);
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.sources[0].primary(), "Windows.Sysinternals.Autoruns");
    }

    #[test]
    fn test_scan_catalog_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("artifact_pack.zip");
        {
            let mut zip = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("Windows/Autoruns.yaml", options).unwrap();
            zip.write_all(DEFINITION.as_bytes()).unwrap();
            zip.finish().unwrap();
        }

        let outcome = scan_path(&archive, &extensions(), &Reporter::quiet()).unwrap();
        assert_eq!(outcome.definitions, 1);
        assert_eq!(
            outcome.sources[0].url,
            "https://live.sysinternals.com/tools/autorunsc64.exe"
        );
    }

    #[test]
    fn test_scan_rejects_plain_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "hello").unwrap();
        assert!(matches!(
            scan_path(&file, &extensions(), &Reporter::quiet()),
            Err(BundleError::InvalidConfig(_))
        ));
    }
}
