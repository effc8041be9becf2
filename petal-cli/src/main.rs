//! Petal CLI
//!
//! Command-line interface for submitting runs to a Petal exec server and
//! following their output.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "petal")]
#[command(about = "Petal run management CLI", long_about = None)]
struct Cli {
    /// Exec server address; falls back to the global config file
    #[arg(long, env = "PETAL_EXEC_URL", global = true)]
    exec_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = config::Config::resolve(cli.exec_url)?;

    handle_command(cli.command, &config).await
}
