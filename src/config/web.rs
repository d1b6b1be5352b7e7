use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebConfig {
    /// Address to listen on for web endpoints
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Path under which metrics are exposed
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl WebConfig {
    pub fn validate(&self) -> Result<()> {
        let path = self.telemetry_path.trim_matches('/');
        if path.is_empty() || path.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "telemetry_path must be a single path segment, got {:?}",
                self.telemetry_path
            )));
        }
        Ok(())
    }

    /// Telemetry path without surrounding slashes, as used for route matching
    pub fn telemetry_segment(&self) -> String {
        self.telemetry_path.trim_matches('/').to_string()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// One of "error", "warn", "info", "debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<()> {
        match self.level.as_str() {
            "error" | "warn" | "info" | "debug" => Ok(()),
            other => Err(Error::InvalidConfig(format!(
                "log level must be one of error, warn, info, debug; got {other:?}"
            ))),
        }
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9201))
}

fn default_telemetry_path() -> String {
    "/metrics".to_string()
}

fn default_log_level() -> String {
    "debug".to_string()
}
