use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Leader election settings
///
/// At most one backend may be enabled: either an advisory lock id is set, or
/// the external-decision endpoint is turned on.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    /// Advisory lock key shared by one high-availability group (0 = unset)
    #[serde(default)]
    pub advisory_lock_id: i64,

    /// Resign leadership when no batch arrived within this window
    /// (unit: milliseconds). 0 disables idle resignation, negative values
    /// are rejected. Required with the advisory lock backend.
    #[serde(default)]
    pub idle_timeout_ms: Option<i64>,

    /// Let an external coordinator decide leadership through `/admin/leader`
    #[serde(default)]
    pub external_decision: bool,

    /// Period of the scheduled election (unit: milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            advisory_lock_id: 0,
            idle_timeout_ms: None,
            external_decision: false,
            interval_ms: default_interval_ms(),
        }
    }
}

/// Election backend resolved from configuration, chosen once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElectionBackend {
    /// Every instance writes
    Disabled,
    AdvisoryLock {
        lock_id: i64,
        interval: Duration,
        /// `None` when idle resignation is disabled
        idle_timeout: Option<Duration>,
    },
    ExternalDecision,
}

impl ElectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::InvalidConfig("election interval_ms must be greater than 0".into()));
        }
        if let Some(timeout) = self.idle_timeout_ms {
            if timeout < 0 {
                return Err(Error::InvalidConfig(format!(
                    "election idle_timeout_ms must not be negative, got {timeout}"
                )));
            }
        }
        self.backend().map(|_| ())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn backend(&self) -> Result<ElectionBackend> {
        let advisory_lock = self.advisory_lock_id != 0;

        if advisory_lock && self.external_decision {
            return Err(Error::InvalidConfig(
                "use either the external decision endpoint or the advisory lock for leader election"
                    .into(),
            ));
        }

        if self.external_decision {
            return Ok(ElectionBackend::ExternalDecision);
        }

        if !advisory_lock {
            return Ok(ElectionBackend::Disabled);
        }

        let idle_timeout = match self.idle_timeout_ms {
            None => {
                return Err(Error::InvalidConfig(
                    "idle_timeout_ms must be set when using the advisory lock".into(),
                ))
            }
            Some(ms) if ms < 0 => {
                return Err(Error::InvalidConfig(format!(
                    "election idle_timeout_ms must not be negative, got {ms}"
                )))
            }
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms as u64)),
        };

        Ok(ElectionBackend::AdvisoryLock {
            lock_id: self.advisory_lock_id,
            interval: self.interval(),
            idle_timeout,
        })
    }
}

fn default_interval_ms() -> u64 {
    5000
}
