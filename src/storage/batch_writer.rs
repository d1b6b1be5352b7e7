//! Staged batch ingestion.
//!
//! Every batch runs on one reserved session:
//!
//! 1. `CreateStaging`: session-scoped staging table, rows kept across commits
//! 2. `BulkLoad`: all canonicalized rows in one bulk copy
//! 3. `InsertLabels`: unseen label sets, own transaction, no-op on conflict
//! 4. `InsertValues`: one value row per staged row joined to its label id,
//!    own transaction
//! 5. `Release`: staging dropped and session released on every exit path
//!
//! Phases 3 and 4 commit independently. A failure in between leaves label
//! rows without value rows; since label insertion is idempotent and values are
//! re-derived from the staged rows, submitting the same batch again is safe.
//! The writer itself never retries.

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;
use tracing::error;

use super::IngestSession;
use super::Sample;
use super::SessionSource;
use super::StagedRow;
use super::Writer;
use crate::HealthCheck;
use crate::Result;
use crate::StorageError;

pub struct BatchWriter<S: SessionSource> {
    source: S,
    log_samples: bool,
}

impl<S: SessionSource> BatchWriter<S> {
    pub fn new(
        source: S,
        log_samples: bool,
    ) -> Self {
        Self { source, log_samples }
    }

    /// Canonicalizes the batch into staging rows. A timestamp the time
    /// column cannot hold fails the whole batch.
    pub(crate) fn stage_rows(
        &self,
        samples: &[Sample],
    ) -> std::result::Result<Vec<StagedRow>, StorageError> {
        let mut rows = Vec::with_capacity(samples.len());
        for sample in samples {
            let row = StagedRow::from_sample(sample).ok_or(StorageError::TimestampOutOfRange {
                timestamp_ms: sample.timestamp_ms,
            })?;
            if self.log_samples {
                println!("{}", row.display_line());
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Phases 1 to 4; the caller owns phase 5.
async fn run_phases(
    session: &mut dyn IngestSession,
    rows: &[StagedRow],
) -> std::result::Result<(), StorageError> {
    session.create_staging().await?;
    session.bulk_load(rows).await?;
    let new_label_sets = session.insert_labels().await?;
    let values = session.insert_values().await?;
    debug!(new_label_sets, values, "staged batch committed");
    Ok(())
}

#[async_trait]
impl<S: SessionSource> Writer for BatchWriter<S> {
    async fn write(
        &self,
        samples: &[Sample],
    ) -> Result<()> {
        let begin = Instant::now();
        let rows = self.stage_rows(samples).map_err(|e| {
            error!("Rejecting batch: {}", e);
            e
        })?;

        let mut session = self.source.acquire().await.map_err(|e| {
            error!("Failed to acquire database session: {}", e);
            e
        })?;

        let result = run_phases(session.as_mut(), &rows).await;
        session.release().await;

        if let Err(e) = result {
            error!("Batch write failed: {}", e);
            return Err(e.into());
        }

        debug!(
            count = samples.len(),
            duration = begin.elapsed().as_secs_f64(),
            "Wrote samples"
        );
        Ok(())
    }

    fn name(&self) -> String {
        self.source.name().to_string()
    }
}

#[async_trait]
impl<S: SessionSource> HealthCheck for BatchWriter<S> {
    async fn health_check(&self) -> Result<()> {
        self.source.ping().await.map_err(|e| {
            debug!("Health check error: {}", e);
            e.into()
        })
    }
}
