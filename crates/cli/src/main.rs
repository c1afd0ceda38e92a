use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use memwatch_core::Config;

mod cli;

use cli::{Cli, Commands};

/// Status for invalid configuration or usage, distinct from the restart codes
const CONFIG_ERROR_EXIT: u8 = 2;

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(CONFIG_ERROR_EXIT)
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    cli::apply_overrides(&mut config, &cli.overrides)?;

    // Use the configured level by default, "debug" with --verbose
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => crate::cli::run::run(args, config),
        Commands::Check => crate::cli::check::run(&config),
        Commands::Config(args) => crate::cli::config::run(args, &config),
    }
}
