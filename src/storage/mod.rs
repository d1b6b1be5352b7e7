//! Batch persistence.
//!
//! [`Writer`] is the destination capability the write path hands batches to.
//! [`BatchWriter`] implements it on top of a [`SessionSource`] by running the
//! staging/dedup/insert phases of [`WritePhase`] on one reserved session.

mod batch_writer;
mod postgres;
mod sample;
pub use batch_writer::*;
pub use postgres::*;
pub use sample::*;


use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;
use crate::StorageError;

/// Phases of one batch write, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WritePhase {
    /// Reserve a session from the pool
    Acquire,
    /// Create the session-scoped staging table
    CreateStaging,
    /// Bulk-load canonicalized rows into staging
    BulkLoad,
    /// Insert unseen label sets (own transaction, idempotent)
    InsertLabels,
    /// Insert one value row per staged row (own transaction)
    InsertValues,
    /// Drop staging and hand the session back
    Release,
}

impl fmt::Display for WritePhase {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            WritePhase::Acquire => "acquire",
            WritePhase::CreateStaging => "create_staging",
            WritePhase::BulkLoad => "bulk_load",
            WritePhase::InsertLabels => "insert_labels",
            WritePhase::InsertValues => "insert_values",
            WritePhase::Release => "release",
        };
        f.write_str(name)
    }
}

/// Destination of leader-gated batches
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Writer: Send + Sync + 'static {
    async fn write(
        &self,
        samples: &[Sample],
    ) -> Result<()>;

    /// Label value used for per-destination metrics
    fn name(&self) -> String;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    async fn health_check(&self) -> Result<()>;
}

/// One reserved store session. Staging state created through it is only
/// visible to later calls on the same session.
#[async_trait]
pub trait IngestSession: Send {
    async fn create_staging(&mut self) -> std::result::Result<(), StorageError>;

    async fn bulk_load(
        &mut self,
        rows: &[StagedRow],
    ) -> std::result::Result<(), StorageError>;

    /// Returns the number of new label rows
    async fn insert_labels(&mut self) -> std::result::Result<u64, StorageError>;

    /// Returns the number of value rows written
    async fn insert_values(&mut self) -> std::result::Result<u64, StorageError>;

    /// Drops the staging table and releases the session. A session whose
    /// staging table cannot be dropped is closed instead of reused.
    async fn release(self: Box<Self>);
}

/// Pool of sessions the batch writer reserves from
#[async_trait]
pub trait SessionSource: Send + Sync + 'static {
    async fn acquire(&self) -> std::result::Result<Box<dyn IngestSession>, StorageError>;

    async fn ping(&self) -> std::result::Result<(), StorageError>;

    fn name(&self) -> &str;
}

#[async_trait]
impl<S: SessionSource> SessionSource for std::sync::Arc<S> {
    async fn acquire(&self) -> std::result::Result<Box<dyn IngestSession>, StorageError> {
        self.as_ref().acquire().await
    }

    async fn ping(&self) -> std::result::Result<(), StorageError> {
        self.as_ref().ping().await
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }
}
