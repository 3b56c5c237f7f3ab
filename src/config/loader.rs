//! Configuration loading from file system
//!
//! Reads `<config_dir>/clipnote/config.json`. Any problem with the file
//! (missing, unreadable, malformed) yields defaults; it is never an error.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use super::defaults::CONFIG_FILE_NAME;
use super::types::Config;

/// Path of the user config file
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clipnote")
        .join(CONFIG_FILE_NAME)
}

/// Load configuration from the default location
pub fn load_config() -> Config {
    load_config_from(&config_path())
}

/// Load configuration from `path`.
///
/// Returns `Config::default()` if the file is missing or cannot be parsed.
#[instrument(name = "load_config", skip_all, fields(path = %path.display()))]
pub fn load_config_from(path: &Path) -> Config {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Config file not found, using defaults");
            return Config::default();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read config file, using defaults");
            return Config::default();
        }
    };

    match serde_json::from_str::<Config>(&contents) {
        Ok(config) => {
            info!("Successfully loaded config");
            config.validated()
        }
        Err(e) => {
            warn!(error = %e, "Failed to parse config JSON, using defaults");
            Config::default()
        }
    }
}

/// Write `config` to `path` as pretty JSON, creating parent directories
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    info!(path = %path.display(), "Saved config");
    Ok(())
}
