//! Run-scoped reporter.
//!
//! Every stage receives a `&Reporter` instead of writing to a process-wide log.
//! User-facing progress goes to stdout, recoverable failures are collected as
//! [`Warning`]s so the final summary can enumerate them, and diagnostics are
//! mirrored to `tracing`.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Binaries,
    Catalog,
    Scan,
    Tools,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Binaries => "binaries",
            Stage::Catalog => "catalog",
            Stage::Scan => "scan",
            Stage::Tools => "tools",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable failure: the subject is the URL, path or platform key the
/// user would re-run for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub stage: Stage,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Reporter {
    quiet: bool,
    warnings: Mutex<Vec<Warning>>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter that collects warnings but prints nothing.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    pub fn stage(&self, message: impl fmt::Display) {
        tracing::info!("{}", message);
        if !self.quiet {
            println!("\n{}", message);
        }
    }

    pub fn success(&self, message: impl fmt::Display) {
        tracing::debug!("{}", message);
        if !self.quiet {
            println!("   ✓ {}", message);
        }
    }

    pub fn warn(&self, stage: Stage, subject: impl Into<String>, message: impl Into<String>) {
        let warning = Warning {
            stage,
            subject: subject.into(),
            message: message.into(),
        };
        tracing::warn!(stage = %warning.stage, subject = %warning.subject, "{}", warning.message);
        if !self.quiet {
            eprintln!("   ⚠ {}: {}", warning.subject, warning.message);
        }
        self.lock().push(warning);
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.lock().clone()
    }

    pub fn warning_count(&self) -> usize {
        self.lock().len()
    }

    /// Final lines of a run: the outcome and every collected warning.
    pub fn finish(&self, headline: impl fmt::Display) {
        let warnings = self.warnings();
        tracing::info!(warnings = warnings.len(), "{}", headline);
        if self.quiet {
            return;
        }
        if warnings.is_empty() {
            println!("\n✅ {}", headline);
            return;
        }
        println!("\n⚠️  {} (completed with {} warnings)", headline, warnings.len());
        for warning in &warnings {
            println!("   - [{}] {}: {}", warning.stage, warning.subject, warning.message);
        }
    }

    /// Progress bar for a counted unit of work; hidden for quiet reporters.
    pub fn progress(&self, len: u64) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template("   [{bar:30}] {pos}/{len} {wide_msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Warning>> {
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Install the `tracing` subscriber for diagnostics on stderr.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects `debug`.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "offline_builder=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
