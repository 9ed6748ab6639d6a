//! Configuration file resolution and loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable naming a session config file
pub const CONFIG_ENV_VAR: &str = "VRS_CONFIG";

/// Config file path resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable (`env_var_name`)
/// 3. Per-user config file (`<config dir>/vrs/config.toml`) if it exists
///
/// Returns `None` when the built-in defaults should be used.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    user_config_file().filter(|path| path.exists())
}

/// Per-user config file location for the platform
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vrs").join("config.toml"))
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Deserialize TOML text
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Load a config file if one resolves, otherwise fall back to `T::default()`
pub fn load_or_default<T>(cli_arg: Option<&Path>, env_var_name: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match resolve_config_path(cli_arg, env_var_name) {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration file");
            load_toml(&path)
        }
        None => {
            tracing::debug!("No configuration file found, using defaults");
            Ok(T::default())
        }
    }
}
