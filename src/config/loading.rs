//! Configuration loading functionality.
//!
//! Handles locating the configuration file, creating the default one on first
//! start and parsing it into a validated [`Config`].

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::Config;
use super::validation::validate_config;

const CONFIG_DIR_NAME: &str = "deep-slumber";
const CONFIG_FILE_NAME: &str = "deep-slumber.toml";

/// Load configuration from the default location.
///
/// This function will create a default configuration file if none exists.
pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        super::builder::create_default_config(&config_path)
            .context("Failed to create default config during load")?;
    }

    load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))
}

/// Load configuration from a specific path.
///
/// This version does NOT create a default config if the path doesn't exist.
pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found at {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Default configuration file path, honouring `XDG_CONFIG_HOME`.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
