//! Configuration management for probekit
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use probekit::config::Config;
//! use probekit::handlers::HandlerRegistry;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! let registry = HandlerRegistry::with_options(config.registry_options());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `PROBEKIT__<section>__<key>`
//!
//! Examples:
//! - `PROBEKIT__HANDLERS__REFERENCE_PREFIX=@`
//! - `PROBEKIT__RETRY__COUNT=3`
//! - `PROBEKIT__WAIT__TIMEOUT=30s`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/probekit.toml`.
//! This can be overridden using the `PROBEKIT_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{Config, HandlerSettings, RetrySettings, WaitSettings};
pub use validation::ValidationError;

use crate::handlers::{RegistryOptions, RetryOptions};
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
    /// 1. Environment variables (`PROBEKIT__*`)
    /// 2. TOML file (default: `config/probekit.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (bad reference prefix, zero depth, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Registry settings derived from the `[handlers]` and `[wait]` sections
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            reference_prefix: self.handlers.reference_prefix.clone(),
            max_interaction_depth: self.handlers.max_interaction_depth,
            wait_timeout: self.wait.timeout.map(|t| t.as_duration()),
        }
    }

    /// Render as TOML, e.g. to write a starter `config/probekit.toml`
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Retry options for a spec that enables retries with the configured defaults
    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions::new(self.retry.count, self.retry.delay.as_duration())
    }
}
