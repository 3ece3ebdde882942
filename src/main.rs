use clap::Parser;
use liquid_agents::cli::{Cli, Commands};
use tracing::error;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            init_logging_simple();
            error!("failed to load configuration: {e:#}");
            return Err(e);
        }
    };

    match &cli.command {
        Commands::Demo(_) => init_logging(&config.logging),
        Commands::Config(_) => init_logging_simple(),
    }

    cli.run(config).await
}
