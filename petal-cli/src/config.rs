//! Configuration module
//!
//! Resolves the exec server address from the command line, the environment
//! or the global config file at `$PETAL_HOME/config.toml`
//! (`~/.petal/config.toml` by default):
//!
//! ```toml
//! [federation]
//! default = "127.0.0.1:9093"
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the global config file inside the Petal home directory
pub const GLOBAL_CONFIG_FILE: &str = "config.toml";

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the exec server
    pub exec_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct GlobalConfig {
    #[serde(default)]
    federation: FederationSection,
}

#[derive(Debug, Default, Deserialize)]
struct FederationSection {
    default: Option<String>,
}

impl Config {
    /// Resolve the exec server address
    ///
    /// An explicit address (flag or `PETAL_EXEC_URL`) wins over the global
    /// config file.
    pub fn resolve(explicit: Option<String>) -> Result<Self> {
        Self::resolve_with_home(explicit, petal_home().as_deref())
    }

    fn resolve_with_home(explicit: Option<String>, home: Option<&Path>) -> Result<Self> {
        let address = match explicit.filter(|a| !a.trim().is_empty()) {
            Some(address) => address,
            None => match home {
                Some(home) => load_default_address(&home.join(GLOBAL_CONFIG_FILE))?,
                None => None,
            }
            .context("No exec address was provided and no global config was found.")?,
        };

        Ok(Self {
            exec_url: normalize_address(&address),
        })
    }
}

/// Directory holding Petal's global state
pub fn petal_home() -> Option<PathBuf> {
    match std::env::var_os("PETAL_HOME") {
        Some(home) if !home.is_empty() => Some(PathBuf::from(home)),
        _ => dirs::home_dir().map(|home| home.join(".petal")),
    }
}

/// Read `federation.default` from a global config file, if the file exists
fn load_default_address(path: &Path) -> Result<Option<String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let config: GlobalConfig =
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))?;

    match config.federation.default {
        Some(address) if address.trim().is_empty() => {
            bail!("`federation.default` in {} is empty", path.display())
        }
        other => Ok(other),
    }
}

/// Bare `host:port` addresses are taken to be plain HTTP
fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
