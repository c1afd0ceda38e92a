use anyhow::Result;
use clap::{Args, Subcommand};

use memwatch_core::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print a single value, e.g. restart.proceed_tasks
    Get { key: String },
}

pub fn run(args: ConfigArgs, config: &Config) -> Result<()> {
    match args.command {
        ConfigCommands::Show => print!("{}", config.to_toml_string()?),
        ConfigCommands::Get { key } => println!("{}", config.get_value(&key)?),
    }
    Ok(())
}
