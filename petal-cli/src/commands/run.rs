//! `petal run`

use anyhow::{Context, Result};
use colored::*;
use petal_client::ExecClient;
use petal_core::config::{flatten_toml, merge_overrides, parse_override};
use petal_core::domain::bundle::Bundle;
use petal_core::dto::run::StartRunRequest;
use std::collections::HashMap;
use std::path::Path;

/// Submit a bundle and print the new run id
pub async fn start_run(
    client: &ExecClient,
    bundle_path: &Path,
    run_config: &[String],
    run_config_file: Option<&Path>,
) -> Result<()> {
    let override_config = collect_overrides(run_config, run_config_file)?;

    let content = tokio::fs::read(bundle_path)
        .await
        .with_context(|| format!("Failed to read bundle {}", bundle_path.display()))?;
    let fab = Bundle::new(content);

    println!(
        "{} {} ({} bytes, {})",
        "Submitting".bold(),
        bundle_path.display(),
        fab.content.len(),
        fab.hash_str.dimmed()
    );

    let response = client
        .start_run(StartRunRequest {
            fab,
            override_config,
        })
        .await
        .context("Failed to start run")?;

    println!(
        "{} Run {} started",
        "✓".green(),
        response.run_id.to_string().cyan()
    );
    println!(
        "  Follow its logs with: {}",
        format!("petal log {}", response.run_id).dimmed()
    );

    Ok(())
}

/// Overrides from the optional TOML file, then from `-c` flags
///
/// A flag may override a key from the file; giving the same key twice on the
/// command line is an error.
fn collect_overrides(
    run_config: &[String],
    run_config_file: Option<&Path>,
) -> Result<HashMap<String, String>> {
    let mut overrides = match run_config_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let table: toml::Table = toml::from_str(&raw)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?;
            flatten_toml(&table)
        }
        None => HashMap::new(),
    };

    let pairs = run_config
        .iter()
        .map(|raw| parse_override(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut from_flags = HashMap::new();
    merge_overrides(&mut from_flags, pairs)?;
    overrides.extend(from_flags);

    Ok(overrides)
}
