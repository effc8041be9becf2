//! `petal stop`

use anyhow::{Context, Result};
use colored::*;
use petal_client::ExecClient;

use super::colorize_status;

/// Stop a run
pub async fn stop_run(client: &ExecClient, run_id: i64) -> Result<()> {
    match client.stop_run(run_id).await {
        Ok(response) => {
            println!(
                "{} Run {} is now {}",
                "✓".green(),
                response.run_id.to_string().cyan(),
                colorize_status(response.status)
            );
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            anyhow::bail!("Run {} does not exist", run_id)
        }
        Err(e) if e.is_conflict() => {
            let run = client.get_run(run_id).await?;
            println!(
                "{} Run {} already finished ({})",
                "!".yellow(),
                run_id.to_string().cyan(),
                colorize_status(run.status)
            );
            Ok(())
        }
        Err(e) => Err(e).context("Failed to stop run"),
    }
}
