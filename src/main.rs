mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use transferbox::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };
    transferbox::telemetry::init(&config.telemetry);

    match cli.command {
        Commands::Request(args) => commands::request(args)?,
        Commands::Info(args) => commands::info(&config, args).await?,
        Commands::Fetch(args) => commands::fetch(&config, args).await?,
        Commands::Upload(args) => commands::upload(&config, args).await?,
        Commands::Config => commands::show_config(&config)?,
    }

    Ok(())
}
