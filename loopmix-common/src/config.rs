//! Configuration loading and config file resolution
//!
//! loopmix has a single bootstrap configuration file in TOML. Every field has a
//! built-in default, so a missing file is never fatal: the mixer starts with
//! defaults and logs a warning.
//!
//! # Config File Resolution
//!
//! 1. Command-line argument (highest priority)
//! 2. `LOOPMIX_CONFIG` environment variable
//! 3. `<user config dir>/loopmix/config.toml`
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LOOPMIX_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Mixer runtime tuning (optional)
    #[serde(default)]
    pub mixer: MixerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Mixer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Loop enforcement poll cadence in milliseconds
    ///
    /// Loop boundaries may overshoot by up to one interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Initial volume of every track (0-100)
    #[serde(default = "default_volume")]
    pub default_volume: u8,

    /// Initial search keyword handed to the video source
    #[serde(default = "default_search_keyword")]
    pub search_keyword: String,

    /// EventBus channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            default_volume: default_volume(),
            search_keyword: default_search_keyword(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl MixerConfig {
    /// Poll cadence as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_volume() -> u8 {
    50
}

fn default_search_keyword() -> String {
    "ambient noise".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.mixer.poll_interval_ms == 0 {
            return Err(Error::Config(
                "mixer.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.mixer.default_volume > 100 {
            return Err(Error::Config(format!(
                "mixer.default_volume must be 0-100, got {}",
                self.mixer.default_volume
            )));
        }
        Ok(())
    }
}

/// Resolves which config file (if any) to read
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a resolver with an optional command-line override
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Resolve the config file path following the priority order
    ///
    /// Explicit paths (CLI, environment) are returned even if they do not
    /// exist; the default location is only returned when the file exists.
    pub fn resolve(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        default_config_path().filter(|p| p.exists())
    }

    /// Load the resolved config, falling back to defaults when no file exists
    ///
    /// A file that exists but fails to parse or validate is an error. The
    /// caller reports the [`ConfigSource`] once its subscriber is installed.
    pub fn load_or_default(&self) -> Result<(TomlConfig, ConfigSource)> {
        match self.resolve() {
            Some(path) if path.exists() => {
                let config = TomlConfig::load(&path)?;
                Ok((config, ConfigSource::File(path)))
            }
            Some(path) => Ok((TomlConfig::default(), ConfigSource::Missing(path))),
            None => Ok((TomlConfig::default(), ConfigSource::Defaults)),
        }
    }
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from this file
    File(PathBuf),
    /// This file was named explicitly but does not exist
    Missing(PathBuf),
    /// No file named and none at the default location
    Defaults,
}

impl ConfigSource {
    /// Report the source (warns for a missing explicit file)
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => {
                info!("Loaded configuration from {}", path.display());
            }
            ConfigSource::Missing(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
            }
            ConfigSource::Defaults => {
                info!("No config file found, using built-in defaults");
            }
        }
    }
}

/// Default config file location for the platform
///
/// Linux: `~/.config/loopmix/config.toml`, macOS:
/// `~/Library/Application Support/loopmix/config.toml`, Windows:
/// `%APPDATA%\loopmix\config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("loopmix").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert_eq!(config.mixer.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.mixer.default_volume, 50);
        assert_eq!(config.mixer.search_keyword, "ambient noise");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_partial_section() {
        let config = TomlConfig::from_toml_str("[mixer]\npoll_interval_ms = 50\n").unwrap();
        assert_eq!(config.mixer.poll_interval_ms, 50);
        assert_eq!(config.mixer.default_volume, 50);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = TomlConfig::from_toml_str("[mixer]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_volume_out_of_range_rejected() {
        let err = TomlConfig::from_toml_str("[mixer]\ndefault_volume = 101\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = TomlConfig::from_toml_str("[mixer\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
