//! Configuration management commands
//!
//! liquid-agents config show     - Show effective configuration
//! liquid-agents config validate - Validate configuration

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use crate::config::AppConfig;

/// Configuration-related commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration as TOML
    Show {
        /// Configuration section to show (scheduler, logging, demo)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration values
    Validate,
}

impl ConfigCommands {
    pub fn run(self, config: &AppConfig) -> Result<()> {
        match self {
            Self::Show { section } => {
                println!("{}", render(config, section.as_deref())?);
                Ok(())
            }
            Self::Validate => validate(config),
        }
    }
}

/// Render the configuration, or one section of it, as TOML
pub fn render(config: &AppConfig, section: Option<&str>) -> Result<String> {
    let rendered = match section {
        None => toml::to_string_pretty(config)?,
        Some("scheduler") => toml::to_string_pretty(&config.scheduler)?,
        Some("logging") => toml::to_string_pretty(&config.logging)?,
        Some("demo") => toml::to_string_pretty(&config.demo)?,
        Some(other) => bail!("unknown configuration section: {other}"),
    };
    Ok(rendered)
}

fn validate(config: &AppConfig) -> Result<()> {
    match config.validate() {
        Ok(()) => {
            println!("\x1b[32m✓ Configuration is valid\x1b[0m");
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                println!("\x1b[31m✗ {e}\x1b[0m");
            }
            Err(anyhow::anyhow!("{} configuration error(s)", errors.len()))
                .context("configuration validation failed")
        }
    }
}
