pub mod check;
pub mod config;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use memwatch_core::Config;

#[derive(Parser)]
#[command(name = "memwatch")]
#[command(
    about = "Run a worker loop that restarts itself on memory growth, age or cycle count"
)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to $MEMWATCH_CONFIG, then built-in defaults)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override a config value, e.g. --set restart.proceed_tasks=100
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run synthetic work cycles under the configured restart rule
    Run(run::RunArgs),

    /// Validate the restart rule and print it
    Check,

    /// Inspect the effective configuration
    Config(config::ConfigArgs),
}

/// Apply `KEY=VALUE` overrides in order
pub fn apply_overrides(config: &mut Config, overrides: &[String]) -> Result<()> {
    for entry in overrides {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("Override '{}' is not KEY=VALUE", entry))?;
        config
            .set_value(key.trim(), value.trim())
            .with_context(|| format!("Invalid override '{}'", entry))?;
    }
    Ok(())
}
