use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use banking_defense::security::defense::DefenseSystem;
use banking_defense::{config, demo, utils, SecurityEngine, UserStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the end-to-end demo flows
    Demo,

    /// Run a one-off security sweep
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    utils::logging::init_logger();

    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Arc::new(config::load_config()?);

    let store = Arc::new(match &config.data_file {
        Some(path) => UserStore::with_snapshot(path.clone())?,
        None => UserStore::new(),
    });
    let defense = Arc::new(DefenseSystem::new(Arc::clone(&config)));
    let engine = SecurityEngine::new(Arc::clone(&config), Arc::clone(&store), Arc::clone(&defense));

    match cli.command {
        Command::Demo => {
            info!("Starting demo...");
            demo::run_demo(&engine, &store, &defense).await?;
        }
        Command::Scan => {
            info!("Starting security sweep...");
            demo::run_scan(&defense);
        }
    }

    Ok(())
}
