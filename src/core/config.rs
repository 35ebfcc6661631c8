//! Configuration management for rowguard
//!
//! Settings come from an optional TOML file, then `ROWGUARD_*` environment
//! overrides, then validation.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default configuration file name looked up by [`Config::load`]
pub const CONFIG_FILE: &str = "rowguard.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// In-process document store
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend implementation
    pub backend: BackendType,

    /// Logical database name
    pub database: String,

    /// Maximum concurrently checked-out sessions (0 = unlimited)
    pub max_sessions: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Record operation counters
    pub enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Memory,
            database: "rowguard".to_string(),
            max_sessions: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default file (if present) and environment variables
    pub fn load() -> Result<Self> {
        let mut config = if std::path::Path::new(CONFIG_FILE).exists() {
            Self::from_file(CONFIG_FILE)?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; split out so tests need not touch the process env
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(database) = lookup("ROWGUARD_DATABASE") {
            self.storage.database = database;
        }

        if let Some(max) = lookup("ROWGUARD_MAX_SESSIONS") {
            self.storage.max_sessions = max
                .parse()
                .map_err(|e| Error::config(format!("Invalid max sessions: {}", e)))?;
        }

        if let Some(level) = lookup("ROWGUARD_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("ROWGUARD_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.storage.database.trim().is_empty() {
            return Err(Error::config("Database name must not be empty"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            _ => return Err(Error::config("Invalid log format")),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, BackendType::Memory);
        assert_eq!(config.storage.max_sessions, 0);
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
database = "app"
max_sessions = 8

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.storage.database, "app");
        assert_eq!(config.storage.max_sessions, 8);
        assert_eq!(config.storage.backend, BackendType::Memory);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("ROWGUARD_DATABASE", "other"),
            ("ROWGUARD_MAX_SESSIONS", "50"),
            ("ROWGUARD_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.database, "other");
        assert_eq!(config.storage.max_sessions, 50);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "ROWGUARD_MAX_SESSIONS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.logging.level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.database = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_fails_to_parse() {
        let result = Config::from_toml("[storage]\nbackend = \"tape\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
