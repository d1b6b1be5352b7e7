use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use sqlx::postgres::PgConnectOptions;
use sqlx::postgres::PgSslMode;

use crate::Error;
use crate::Result;

/// PostgreSQL endpoint, credentials, pool bounds and table layout
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PostgresConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    /// File to read the password from. Re-read whenever a new session is
    /// established so rotated credentials are picked up without a restart.
    #[serde(default)]
    pub password_file: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// libpq style ssl mode: disable, allow, prefer, require, verify-ca, verify-full
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Prefix for the `_tmp`, `_labels` and `_values` relations
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,

    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,

    /// Print every staged sample to stdout
    #[serde(default)]
    pub log_samples: bool,

    /// How many times to retry connecting to the database on startup
    #[serde(default)]
    pub db_connect_retries: usize,

    /// Fixed delay between startup connection attempts (unit: milliseconds)
    #[serde(default = "default_db_connect_retry_delay_ms")]
    pub db_connect_retry_delay_ms: u64,

    /// Session establishment timeout (unit: seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password_file: String::new(),
            database: default_database(),
            ssl_mode: default_ssl_mode(),
            table: default_table(),
            max_open_conns: default_max_open_conns(),
            max_idle_conns: default_max_idle_conns(),
            log_samples: false,
            db_connect_retries: 0,
            db_connect_retry_delay_ms: default_db_connect_retry_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl PostgresConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_plain_identifier(&self.table) {
            return Err(Error::InvalidConfig(format!(
                "table prefix {:?} must start with a letter or underscore and contain only \
                 ASCII letters, digits or underscores",
                self.table
            )));
        }

        if self.max_open_conns == 0 {
            return Err(Error::InvalidConfig("max_open_conns must be greater than 0".into()));
        }

        if self.max_idle_conns > self.max_open_conns {
            return Err(Error::InvalidConfig(format!(
                "max_idle_conns ({}) cannot exceed max_open_conns ({})",
                self.max_idle_conns, self.max_open_conns
            )));
        }

        self.ssl_mode()?;
        Ok(())
    }

    pub fn ssl_mode(&self) -> Result<PgSslMode> {
        self.ssl_mode
            .parse::<PgSslMode>()
            .map_err(|e| Error::InvalidConfig(format!("invalid ssl_mode {:?}: {}", self.ssl_mode, e)))
    }

    /// Connection options without a password; the session source fills the
    /// password in from `password_file` before sessions are established.
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .ssl_mode(self.ssl_mode()?))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.db_connect_retry_delay_ms)
    }

    /// Human readable endpoint, safe to log
    pub fn endpoint(&self) -> String {
        format!(
            "host={} port={} user={} dbname={} sslmode={}",
            self.host, self.port, self.user, self.database, self.ssl_mode
        )
    }
}

/// Table prefixes are interpolated into SQL text, so they are restricted to
/// identifiers that need no quoting.
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_user() -> String {
    "postgres".to_string()
}
fn default_database() -> String {
    "postgres".to_string()
}
fn default_ssl_mode() -> String {
    "disable".to_string()
}
fn default_table() -> String {
    "metrics".to_string()
}
fn default_max_open_conns() -> u32 {
    50
}
fn default_max_idle_conns() -> u32 {
    10
}
fn default_db_connect_retry_delay_ms() -> u64 {
    5000
}
fn default_connect_timeout_secs() -> u64 {
    10
}
