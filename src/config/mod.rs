//! Configuration management for TransferBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use transferbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Max concurrent transfers: {}", config.scheduler.max_concurrency);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `TRANSFERBOX__<section>__<key>`
//!
//! Examples:
//! - `TRANSFERBOX__SOURCE__BASE_URL=https://files.example.com/api/path`
//! - `TRANSFERBOX__SCHEDULER__MAX_CONCURRENCY=8`
//! - `TRANSFERBOX__UPLOAD__CHUNK_SIZE=1MB`
//!
//! The source API key is read from `TRANSFERBOX_API_KEY` only.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/transferbox.toml`.
//! This can be overridden using the `TRANSFERBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, FetchConfig, HttpConfig, SchedulerConfig, SourceConfig, TelemetryConfig, UploadConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`TRANSFERBOX__*`)
    /// 2. TOML file (default: `config/transferbox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path, still honouring the environment
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let mut config = sources::load_from_sources(path)?;
        sources::load_secrets(&mut config);
        validation::validate(&config)?;
        Ok(config)
    }
}
