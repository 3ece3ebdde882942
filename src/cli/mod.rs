//! liquid-agents CLI
//!
//! Commands:
//! - `liquid-agents demo`   - Run simulated market agents under the scheduler
//! - `liquid-agents config` - Configuration management

pub mod config;
pub mod demo;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;

/// Agent scheduler demo CLI
#[derive(Parser, Debug)]
#[command(name = "liquid-agents")]
#[command(author, version, about = "Run independent agents under a fault-isolating scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration directory (default.toml, $LIQUID_ENV.toml)
    #[arg(long, global = true, default_value = "config", env = "LIQUID_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register market agents, start them, dispatch rounds, stop them
    Demo(demo::DemoArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

impl Cli {
    /// Effective configuration: files and environment, then command-line overrides
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load_from(&self.config_dir)?;
        if let Commands::Demo(args) = &self.command {
            args.apply(&mut config);
        }
        Ok(config)
    }

    pub async fn run(self, config: AppConfig) -> Result<()> {
        match self.command {
            Commands::Demo(_) => demo::run(config).await,
            Commands::Config(cmd) => cmd.run(&config),
        }
    }
}
