//! Configuration management for the remote-write adapter.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Component-wise validation
mod election;
mod postgres;
mod web;
pub use election::*;
pub use postgres::*;
pub use web::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `ADAPTER__POSTGRES__HOST=db`
pub(crate) const ENV_PREFIX: &str = "ADAPTER";

/// Main configuration container for the adapter
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Optional `config/local` overrides
/// 4. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct AdapterConfig {
    /// HTTP listener and telemetry endpoint
    #[serde(default)]
    pub web: WebConfig,
    /// Log verbosity
    #[serde(default)]
    pub log: LogConfig,
    /// Store endpoint, pool bounds and table prefix
    #[serde(default)]
    pub postgres: PostgresConfig,
    /// Leader election backend selection
    #[serde(default)]
    pub election: ElectionConfig,
}

impl Debug for AdapterConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("web", &self.web)
            .field("log", &self.log)
            .field("postgres", &self.postgres)
            .field("election", &self.election)
            .finish()
    }
}

impl AdapterConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/adapter.toml");
    /// std::env::set_var("ADAPTER__ELECTION__ADVISORY_LOCK_ID", "42");
    /// let cfg = AdapterConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem, including the election
    /// rules: both backends configured, a negative idle timeout, or an
    /// advisory lock without an idle timeout.
    pub fn validate(self) -> Result<Self> {
        self.web.validate()?;
        self.log.validate()?;
        self.postgres.validate()?;
        self.election.validate()?;
        Ok(self)
    }
}
