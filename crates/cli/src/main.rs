//! Orderstream CLI - database migrations and test publishing.
//!
//! # Usage
//!
//! ```bash
//! # Apply the order schema
//! os-cli migrate
//!
//! # Publish an order (or a JSON array of orders) to the order topic
//! os-cli produce --file model.json
//!
//! # Override the message key (defaults to each order's uid)
//! os-cli produce --file model.json --key replay-1
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `produce` - Publish orders from a JSON file

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "os-cli")]
#[command(author, version, about = "Orderstream CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Publish orders from a JSON file to the order topic
    Produce {
        /// Path to a JSON order, or a JSON array of orders
        #[arg(short, long)]
        file: PathBuf,

        /// Message key (defaults to each order's uid)
        #[arg(short, long)]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Produce { file, key } => {
            commands::produce::run(&file, key.as_deref()).await?;
        }
    }
    Ok(())
}
