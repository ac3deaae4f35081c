//! Configuration module for the ledger engine.
//!
//! Provides configuration loading, validation, and environment
//! variable overrides for deploy-varying values.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ledger_engine::config::load_config;
//!
//! // Load from default path (config.yaml), falling back to defaults
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::accrual::AccrualConfig;
use crate::reconciliation::PoolConfig;

/// Default configuration file path.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration (consumed by the HTTP layer).
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Accrual service configuration.
    #[serde(default)]
    pub accrual: AccrualServiceConfig,
    /// Reconciliation pool configuration.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address and port the HTTP layer binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Usually supplied via `DATABASE_URI`.
    #[serde(default)]
    pub url: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Per-operation query deadline, in seconds.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Per-operation query deadline.
    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

/// Accrual service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualServiceConfig {
    /// Base address of the accrual service. Usually supplied via
    /// `ACCRUAL_SYSTEM_ADDRESS`.
    #[serde(default)]
    pub address: String,
    /// HTTP request timeout, in seconds.
    #[serde(default = "default_accrual_timeout_secs")]
    pub timeout_secs: u64,
}

impl AccrualServiceConfig {
    /// Build the client-level configuration.
    #[must_use]
    pub fn client_config(&self) -> AccrualConfig {
        AccrualConfig::new(self.address.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

impl Default for AccrualServiceConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            timeout_secs: default_accrual_timeout_secs(),
        }
    }
}

/// Reconciliation pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Replacement workers the supervisor may spawn before giving up.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Reconciliation queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl ReconciliationConfig {
    /// Build the pool-level configuration.
    #[must_use]
    pub const fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            max_restarts: self.max_restarts,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_restarts: default_max_restarts(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_bind_address() -> String {
    "localhost:8080".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_query_timeout_secs() -> u64 {
    3
}

const fn default_accrual_timeout_secs() -> u64 {
    10
}

const fn default_workers() -> u32 {
    3
}

const fn default_max_restarts() -> u32 {
    10
}

const fn default_queue_capacity() -> usize {
    256
}

impl Config {
    /// Overlay deploy-varying values from the environment.
    ///
    /// `lookup` abstracts `std::env::var` so overrides stay testable.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(address) = lookup("RUN_ADDRESS") {
            self.server.bind_address = address;
        }
        if let Some(url) = lookup("DATABASE_URI") {
            self.database.url = url;
        }
        if let Some(address) = lookup("ACCRUAL_SYSTEM_ADDRESS") {
            self.accrual.address = address;
        }
    }

    /// Check cross-field invariants after loading and overriding.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.url (or DATABASE_URI) is required".to_string(),
            ));
        }
        if self.accrual.address.is_empty() {
            return Err(ConfigError::ValidationError(
                "accrual.address (or ACCRUAL_SYSTEM_ADDRESS) is required".to_string(),
            ));
        }
        if self.reconciliation.workers == 0 {
            return Err(ConfigError::ValidationError(
                "reconciliation.workers must be at least 1".to_string(),
            ));
        }
        if self.reconciliation.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "reconciliation.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a YAML file, overlay environment overrides,
/// and validate.
///
/// With no explicit path, a missing `config.yaml` is not an error: the
/// defaults plus environment variables are enough for a standard
/// deployment.
///
/// # Errors
///
/// Returns an error when an explicitly given file cannot be read, the
/// YAML does not parse, or validation fails.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => parse_file(path)?,
        None => match std::fs::read_to_string(DEFAULT_CONFIG_PATH) {
            Ok(contents) => serde_yaml_bw::from_str(&contents)?,
            Err(_) => Config::default(),
        },
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

fn parse_file(path: &str) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_string(),
        source,
    })?;
    Ok(serde_yaml_bw::from_str(&contents)?)
}
