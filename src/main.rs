#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;

use offline_builder::cli::{Cli, Commands};
use offline_builder::commands;
use offline_builder::report::init_tracing;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Build(cmd) => commands::build::execute(cmd),
        Commands::Scan(cmd) => commands::scan::execute(cmd),
        Commands::Version => commands::version::execute(),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "Run failed");
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    Ok(())
}
