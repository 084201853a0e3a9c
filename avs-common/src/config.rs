//! Configuration file resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable consulted when no command-line path is given
pub const CONFIG_ENV_VAR: &str = "AVS_CONFIG";

/// Config file resolution following this priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config directory, if the file exists
///
/// Returns `None` when nothing is found; callers fall back to built-in defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_file().filter(|path| path.exists())
}

/// Platform default location of the config file
///
/// - Linux: `~/.config/avs/config.toml`
/// - macOS: `~/Library/Application Support/avs/config.toml`
/// - Windows: `%APPDATA%\avs\config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("avs").join("config.toml"))
}

/// Read a TOML document into any deserializable type
pub fn load_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value = toml::from_str(&content)?;
    tracing::debug!("Loaded TOML document from {}", path.display());
    Ok(value)
}
