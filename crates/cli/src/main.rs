//! Attaché CLI — the main entry point.
//!
//! Commands:
//! - `run`      — Run the assistant once: gather data, email the brief
//! - `calendar` — Fetch and print the upcoming calendar window
//! - `onboard`  — Initialize the config directory

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "attache",
    about = "Attaché — a personal-assistant agent that emails your daily brief",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the assistant once
    Run,

    /// Fetch and print upcoming calendar events
    Calendar {
        /// Override the lookahead window in days
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Initialize configuration
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => commands::run::run().await?,
        Commands::Calendar { days } => commands::calendar::run(days).await?,
        Commands::Onboard => commands::onboard::run()?,
    }

    Ok(())
}
