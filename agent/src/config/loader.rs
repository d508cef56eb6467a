//! Configuration loading utilities for the agent.
//!
//! This module provides functions for reading, parsing and validating
//! configuration files from disk.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;

use crate::config::AgentConfig;

/// Reads, parses and validates the agent config from a TOML file.
///
/// # Arguments
///
/// * `path` - File path to the TOML configuration file.
///
/// # Errors
///
/// Returns an error if the config file cannot be read, parsed, or fails validation.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<AgentConfig> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(&path).await.wrap_err(format!(
        "Failed to read config file at: {}",
        path_ref.display()
    ))?;
    let config: AgentConfig = toml::from_str(&content).wrap_err(format!(
        "Failed to parse config as TOML at: {}",
        path_ref.display()
    ))?;
    config
        .validate()
        .wrap_err(format!("Invalid config at: {}", path_ref.display()))?;
    Ok(config)
}
