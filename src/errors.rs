//! Adapter Error Hierarchy
//!
//! Errors are grouped by the layer that produces them: configuration,
//! leader election, storage and inbound request decoding.

use config::ConfigError;

use crate::storage::WritePhase;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Leadership check or backend failures
    #[error(transparent)]
    Election(#[from] ElectionError),

    /// Batch write or store connectivity failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Inbound remote-write payload could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Metric collector creation or registration failures
    #[error(transparent)]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    SignalSenderClosed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The dedicated lock session could not be established
    #[error("Advisory lock {lock_id} connect failure: {source}")]
    Connect {
        lock_id: i64,
        #[source]
        source: StorageError,
    },

    /// The advisory lock session was lost mid-check
    #[error("Advisory lock {lock_id} session failure: {source}")]
    LockSession {
        lock_id: i64,
        #[source]
        source: sqlx::Error,
    },

    /// The last scheduled lock check failed and no check has succeeded since
    #[error("Advisory lock {lock_id} check failed: {reason}")]
    CheckFailed { lock_id: i64, reason: String },

    /// Releasing a held advisory lock failed
    #[error("Failed to release advisory lock {lock_id}: {source}")]
    Release {
        lock_id: i64,
        #[source]
        source: sqlx::Error,
    },

    /// The server reported that our session did not hold the lock on release
    #[error("Advisory lock {0} was not held by this session")]
    NotHeld(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No session could be reserved from the pool
    #[error("Failed to acquire database session: {0}")]
    Acquire(#[source] sqlx::Error),

    /// A named phase of the batch ingestion protocol failed
    #[error("Batch write failed during {phase}: {source}")]
    Phase {
        phase: WritePhase,
        #[source]
        source: sqlx::Error,
    },

    /// Password file could not be read while establishing a session
    #[error("Failed to read password file {path}: {source}")]
    PasswordFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Health probe failures
    #[error("Health check failed: {0}")]
    HealthCheck(#[source] sqlx::Error),

    /// Startup connectivity exhausted all configured retries
    #[error("Unable to connect to the database after {attempts} attempts")]
    ConnectRetriesExhausted { attempts: usize },

    /// Sample timestamp outside the range the time column can hold
    #[error("Sample timestamp {timestamp_ms}ms is out of range")]
    TimestampOutOfRange { timestamp_ms: i64 },

    /// Failure reported by a non-PostgreSQL session source
    #[error("Storage error during {phase}: {message}")]
    Backend { phase: WritePhase, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Snappy decompression failed: {0}")]
    Snappy(#[from] snap::Error),

    #[error("Protobuf decoding failed: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

impl StorageError {
    /// Phase the error was raised in, if it came from the ingestion protocol.
    pub fn phase(&self) -> Option<WritePhase> {
        match self {
            StorageError::Phase { phase, .. } | StorageError::Backend { phase, .. } => Some(*phase),
            StorageError::TimestampOutOfRange { .. } => Some(WritePhase::BulkLoad),
            _ => None,
        }
    }
}
