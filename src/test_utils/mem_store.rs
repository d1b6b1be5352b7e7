//! In-memory [`SessionSource`] with the same commit semantics as the
//! PostgreSQL tables: label rows deduplicated on insert, value rows appended,
//! each insert phase committing on its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use parking_lot::Mutex;

use crate::IngestSession;
use crate::LabelSet;
use crate::SessionSource;
use crate::StagedRow;
use crate::StorageError;
use crate::WritePhase;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValueRow {
    pub time: DateTime<Utc>,
    pub value: f64,
    pub labels_id: Option<i64>,
}

#[derive(Debug, Default)]
struct MemState {
    labels: BTreeMap<LabelSet, i64>,
    values: Vec<ValueRow>,
    next_label_id: i64,
    open_staging: usize,
    acquired: usize,
    released: usize,
    fail_at: Option<WritePhase>,
    healthy: bool,
}

/// Cloning shares the underlying tables.
#[derive(Debug, Clone)]
pub(crate) struct MemStore {
    state: Arc<Mutex<MemState>>,
}

impl MemStore {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemState {
                healthy: true,
                next_label_id: 1,
                ..Default::default()
            })),
        }
    }

    /// Fails every later session at `phase`; `None` clears the fault.
    pub(crate) fn fail_at(
        &self,
        phase: Option<WritePhase>,
    ) {
        self.state.lock().fail_at = phase;
    }

    pub(crate) fn set_healthy(
        &self,
        healthy: bool,
    ) {
        self.state.lock().healthy = healthy;
    }

    pub(crate) fn label_rows(&self) -> Vec<(LabelSet, i64)> {
        self.state.lock().labels.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub(crate) fn value_rows(&self) -> Vec<ValueRow> {
        self.state.lock().values.clone()
    }

    /// Staging tables created but not yet dropped
    pub(crate) fn open_staging(&self) -> usize {
        self.state.lock().open_staging
    }

    pub(crate) fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub(crate) fn released(&self) -> usize {
        self.state.lock().released
    }
}

fn injected(phase: WritePhase) -> StorageError {
    StorageError::Backend {
        phase,
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl SessionSource for MemStore {
    async fn acquire(&self) -> Result<Box<dyn IngestSession>, StorageError> {
        let mut state = self.state.lock();
        if state.fail_at == Some(WritePhase::Acquire) {
            return Err(injected(WritePhase::Acquire));
        }
        state.acquired += 1;
        Ok(Box::new(MemSession {
            state: self.state.clone(),
            staging: None,
        }))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.state.lock().healthy {
            Ok(())
        } else {
            Err(injected(WritePhase::Acquire))
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemSession {
    state: Arc<Mutex<MemState>>,
    staging: Option<Vec<StagedRow>>,
}

impl MemSession {
    fn check(
        &self,
        phase: WritePhase,
    ) -> Result<(), StorageError> {
        if self.state.lock().fail_at == Some(phase) {
            return Err(injected(phase));
        }
        Ok(())
    }

    fn staged(
        &self,
        phase: WritePhase,
    ) -> Result<&Vec<StagedRow>, StorageError> {
        self.staging.as_ref().ok_or_else(|| StorageError::Backend {
            phase,
            message: "staging table does not exist".to_string(),
        })
    }
}

#[async_trait]
impl IngestSession for MemSession {
    async fn create_staging(&mut self) -> Result<(), StorageError> {
        self.check(WritePhase::CreateStaging)?;
        self.staging = Some(Vec::new());
        self.state.lock().open_staging += 1;
        Ok(())
    }

    async fn bulk_load(
        &mut self,
        rows: &[StagedRow],
    ) -> Result<(), StorageError> {
        self.check(WritePhase::BulkLoad)?;
        match self.staging.as_mut() {
            Some(staging) => {
                staging.extend_from_slice(rows);
                Ok(())
            }
            None => Err(StorageError::Backend {
                phase: WritePhase::BulkLoad,
                message: "staging table does not exist".to_string(),
            }),
        }
    }

    async fn insert_labels(&mut self) -> Result<u64, StorageError> {
        self.check(WritePhase::InsertLabels)?;
        let staged = self.staged(WritePhase::InsertLabels)?;
        let mut state = self.state.lock();
        let mut inserted = 0;
        for row in staged {
            if !state.labels.contains_key(&row.label_set) {
                let id = state.next_label_id;
                state.next_label_id += 1;
                state.labels.insert(row.label_set.clone(), id);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_values(&mut self) -> Result<u64, StorageError> {
        self.check(WritePhase::InsertValues)?;
        let staged = self.staged(WritePhase::InsertValues)?;
        let mut state = self.state.lock();
        let rows: Vec<ValueRow> = staged
            .iter()
            .map(|row| ValueRow {
                time: row.time,
                value: row.value,
                labels_id: state.labels.get(&row.label_set).copied(),
            })
            .collect();
        let written = rows.len() as u64;
        state.values.extend(rows);
        Ok(written)
    }

    async fn release(self: Box<Self>) {
        let mut state = self.state.lock();
        if self.staging.is_some() {
            state.open_staging -= 1;
        }
        state.released += 1;
    }
}
