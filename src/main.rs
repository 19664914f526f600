use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod command;

use agent_chat::config::ChatConfig;
use cli::args::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ChatConfig::new(
        &cli.api_url,
        &cli.assistant_id,
        cli.api_key.clone(),
        cli.data_dir.clone(),
    )
    .context("Invalid configuration")?;

    match cli.command {
        Some(Commands::Chat) | None => command::run_chat(config, cli.chat).await?,
        Some(Commands::Fetch { url }) => command::run_fetch(&url).await?,
        Some(Commands::Records { action }) => command::run_records(&config.data_dir, action)?,
    }

    Ok(())
}
