//! `petal ls`

use anyhow::Result;
use colored::*;
use petal_client::ExecClient;
use petal_core::domain::run::Run;
use petal_core::dto::run::RunSummary;

use super::colorize_status;

/// List all runs, or print the details of one
pub async fn list(client: &ExecClient, run_id: Option<i64>) -> Result<()> {
    match run_id {
        Some(run_id) => {
            let run = client.get_run(run_id).await?;
            print_run_details(&run);
        }
        None => {
            let runs = client.list_runs().await?;

            if runs.is_empty() {
                println!("{}", "No runs found.".yellow());
            } else {
                println!("{}", format!("Found {} run(s):", runs.len()).bold());
                println!();
                for run in runs {
                    print_run_summary(&run);
                }
            }
        }
    }

    Ok(())
}

/// Print a run summary
fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.run_id.to_string().bold());
    println!("    Status:   {}", colorize_status(run.status));
    println!("    Bundle:   {}", short_hash(&run.bundle_hash).dimmed());
    println!(
        "    Created:  {}",
        run.requested_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(runner) = &run.runner_id {
        println!("    Runner:   {}", runner.dimmed());
    }
    println!();
}

/// Print detailed run information
fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:          {}", run.run_id.to_string().cyan());
    println!("  Bundle:      {}", run.bundle_hash.dimmed());
    println!("  Status:      {}", colorize_status(run.status));
    println!(
        "  Requested:   {}",
        run.requested_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = run.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = run.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = run.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    if let Some(runner) = &run.runner_id {
        println!("  Runner:      {}", runner);
    }

    if !run.override_config.is_empty() {
        println!("\n{}", "Run Config:".bold());
        let mut keys: Vec<_> = run.override_config.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {} = {}", key.cyan(), run.override_config[key]);
        }
    }

    if let Some(result) = &run.result {
        println!("\n{}", "Result:".bold());
        println!(
            "  Success:    {}",
            if result.success {
                "✓".green()
            } else {
                "✗".red()
            }
        );
        println!("  Exit Code:  {}", result.exit_code);

        if let Some(error) = &result.error_message {
            println!("\n{}", "Error:".bold());
            println!("{}", error.red());
        }
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
