//! Configuration management for avs-coordinator
//!
//! Bootstrap configuration comes from a TOML file. Every setting has a
//! built-in default, so a missing file is not an error unless one was named
//! explicitly.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--tenant, --stays-active-in-background)
//! 2. TOML file named by --config, else AVS_CONFIG, else the platform config dir
//! 3. Built-in defaults (code constants)

use crate::error::Result;
use crate::port::Tenant;
use crate::session::AudioMode;
use avs_common::config::{load_toml, resolve_config_path, CONFIG_ENV_VAR};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Experience id when the coordinator serves one tenant of a shared host
    #[serde(default)]
    pub tenant: Option<String>,

    /// Event bus buffer size
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Initial audio behaviour
    #[serde(default)]
    pub audio_mode: AudioMode,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            tenant: None,
            event_capacity: default_event_capacity(),
            audio_mode: AudioMode::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_event_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub tenant: Option<String>,
    pub stays_active_in_background: Option<bool>,
}

/// Resolved coordinator configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub tenant: Tenant,
    pub audio_mode: AudioMode,
    pub event_capacity: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant: Tenant::Process,
            audio_mode: AudioMode::default(),
            event_capacity: default_event_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the resolved TOML file, or defaults
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the resolved TOML file cannot be read or parsed
    /// - the audio mode describes an impossible combination
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let toml_config = match resolve_config_path(config_path, CONFIG_ENV_VAR) {
            Some(path) => {
                let config: TomlConfig = load_toml(&path)?;
                info!("Loaded TOML configuration from {}", path.display());
                config
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                TomlConfig::default()
            }
        };
        Self::from_toml(toml_config, overrides)
    }

    /// Apply CLI overrides to a parsed TOML configuration
    pub fn from_toml(toml_config: TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let mut audio_mode = toml_config.audio_mode;
        if let Some(stays) = overrides.stays_active_in_background {
            audio_mode.stays_active_in_background = stays;
        }
        audio_mode.resolve()?;

        Ok(Config {
            tenant: Tenant::from_experience(overrides.tenant.or(toml_config.tenant)),
            audio_mode,
            event_capacity: toml_config.event_capacity.max(1),
            log_level: toml_config.logging.level,
        })
    }
}
