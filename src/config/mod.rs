//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod storage;

pub use storage::{StorageConfig, DEFAULT_STORAGE_PATH};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "statera.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "STATERA_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "STATERA";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "STATERA_LOG";

use serde::Deserialize;

use crate::bus::{MessagingConfig, OutboxConfig};
use crate::ingest::IngestConfig;
use crate::notify::NotificationConfig;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command store configuration.
    pub storage: StorageConfig,
    /// Message bus configuration.
    pub messaging: MessagingConfig,
    /// Outbox relay configuration.
    pub outbox: OutboxConfig,
    /// Upload ingestion and summary configuration.
    pub ingest: IngestConfig,
    /// Summary notification configuration.
    pub notification: NotificationConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `statera.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, sections
    ///    separated by `__` (e.g. `STATERA__STORAGE__PATH`)
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing: in-memory storage, immediate outbox recovery.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig::in_memory(),
            outbox: OutboxConfig {
                min_age_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests;
