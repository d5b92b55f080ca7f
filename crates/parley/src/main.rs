mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{expand_path, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    parley_runtime::init_logging();

    // Parse CLI args
    let cli = Cli::parse();

    // Handle init command early (doesn't need config)
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(&expand_path(path));
    }

    // Load config
    let config_path = cli.config.as_deref().map(expand_path);
    let config = config::load_config(config_path.as_deref())?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Chat => {
            let fixtures = commands::chat::FixtureMode::from_flags(
                cli.record.as_deref().map(expand_path),
                cli.replay.as_deref().map(expand_path),
            );
            commands::chat::execute(&config, fixtures).await
        }
        Commands::Tools => commands::tools::execute(&config),
    }
}
