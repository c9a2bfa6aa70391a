use crate::cancel::CancelToken;
use crate::cli::BuildCmd;
use crate::config::BuilderConfig;
use crate::error::Result;
use crate::fetch::HttpTransport;
use crate::pipeline::{self, BuildOptions};
use crate::release::GithubReleases;
use crate::report::Reporter;
use std::path::Path;

pub fn execute(cmd: &BuildCmd) -> Result<()> {
    let config = load_config(cmd)?;
    let options = BuildOptions {
        output: cmd.output.clone(),
        release: cmd.release.clone(),
        force: cmd.force,
        compress: !cmd.no_compress,
    };

    let source = GithubReleases::new(&config.source.repo_owner, &config.source.repo_name);
    let transport = HttpTransport::new()?;
    let cancel = CancelToken::new();
    let reporter = Reporter::new();

    let outcome = pipeline::run(&config, &options, &source, &transport, &cancel, &reporter)?;

    let summary = &outcome.summary;
    println!("\nBundle {}:", outcome.release);
    println!("  Workspace: {}", outcome.workspace.display());
    match &outcome.archive {
        Some(archive) => println!("  Archive:   {}", archive.path.display()),
        None => println!("  Archive:   skipped (--no-compress)"),
    }
    println!("  Binaries:  {}", summary.binaries);
    if !summary.skipped_platforms.is_empty() {
        println!("  Skipped:   {}", summary.skipped_platforms.join(", "));
    }
    println!("  Definitions: {}", summary.definitions);
    println!(
        "  Tools:     {} acquired, {} failed",
        summary.tools_ok, summary.tools_failed
    );
    println!("  Size:      {} bytes", summary.total_bytes);

    reporter.finish(format!("Offline bundle for {} is ready", outcome.release));
    Ok(())
}

fn load_config(cmd: &BuildCmd) -> Result<BuilderConfig> {
    let config = BuilderConfig::load(Path::new("."), cmd.config.as_deref())?;
    let config = match &cmd.repo {
        Some(repo) => config.with_repo(repo)?,
        None => config,
    };
    let config = config.with_jobs(cmd.jobs.map(usize::from));
    config.validate()?;
    Ok(config)
}
