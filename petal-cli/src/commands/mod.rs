//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod log;
mod ls;
mod run;
mod stop;

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use petal_core::domain::run::RunStatus;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a bundle for execution
    Run {
        /// Path to the bundle (.fab) file
        bundle: PathBuf,

        /// Override a run config value, as KEY=VALUE (repeatable)
        #[arg(short = 'c', long = "run-config", value_name = "KEY=VALUE")]
        run_config: Vec<String>,

        /// TOML file with run config overrides; -c values take precedence
        #[arg(long, value_name = "FILE")]
        run_config_file: Option<PathBuf>,
    },
    /// Show the log output of a run
    Log {
        /// Run ID
        run_id: i64,

        /// Print the logs available now instead of following them
        #[arg(long)]
        no_follow: bool,
    },
    /// List runs, or show one run in detail
    Ls {
        /// Run ID
        run_id: Option<i64>,
    },
    /// Stop a queued or running run
    Stop {
        /// Run ID
        run_id: i64,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = petal_client::ExecClient::new(config.exec_url.clone());

    match command {
        Commands::Run {
            bundle,
            run_config,
            run_config_file,
        } => run::start_run(&client, &bundle, &run_config, run_config_file.as_deref()).await,
        Commands::Log { run_id, no_follow } => log::show_logs(&client, run_id, !no_follow).await,
        Commands::Ls { run_id } => ls::list(&client, run_id).await,
        Commands::Stop { run_id } => stop::stop_run(&client, run_id).await,
    }
}

/// Colorize run status for display
pub(crate) fn colorize_status(status: RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Queued => status_str.yellow(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Succeeded => status_str.green(),
        RunStatus::Failed => status_str.red(),
        RunStatus::Cancelled => status_str.dimmed(),
        RunStatus::TimedOut => status_str.red(),
    }
}
