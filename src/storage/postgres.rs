//! PostgreSQL session source for the batch writer.
//!
//! Sessions come from a bounded `sqlx` pool. The password is read from the
//! configured file whenever sessions may be established, so rotated
//! credentials are picked up without a restart.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgConnectOptions;
use sqlx::postgres::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::Connection;
use sqlx::Executor;
use sqlx::PgConnection;
use sqlx::Postgres;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::IngestSession;
use super::SessionSource;
use super::StagedRow;
use super::WritePhase;
use crate::PostgresConfig;
use crate::Result;
use crate::StorageError;

/// COPY payloads are streamed in chunks of roughly this many bytes
const COPY_CHUNK_BYTES: usize = 1 << 20;

/// SQL text for one table prefix
#[derive(Debug)]
pub(crate) struct Statements {
    pub(crate) create_staging: String,
    pub(crate) copy_staging: String,
    pub(crate) insert_labels: String,
    pub(crate) insert_values: String,
    pub(crate) drop_staging: String,
}

impl Statements {
    /// `table` must already be validated as a plain identifier.
    pub(crate) fn new(table: &str) -> Self {
        Self {
            create_staging: format!(
                "create temporary table {table}_tmp (time timestamp with time zone, value double precision, \
                 metric_name text, labels jsonb) on commit preserve rows"
            ),
            copy_staging: format!("copy {table}_tmp (time, value, metric_name, labels) from stdin"),
            insert_labels: format!(
                "insert into {table}_labels (metric_name, labels) select distinct sample.metric_name, \
                 sample.labels from {table}_tmp sample on conflict do nothing"
            ),
            insert_values: format!(
                "insert into {table}_values (time, value, labels_id) select sample.time, sample.value, \
                 lbl.id from {table}_tmp sample left join {table}_labels lbl on lbl.metric_name = \
                 sample.metric_name and lbl.labels = sample.labels"
            ),
            drop_staging: format!("drop table if exists {table}_tmp"),
        }
    }
}

pub struct PgSessionSource {
    pool: PgPool,
    base_options: PgConnectOptions,
    password_file: Option<PathBuf>,
    /// Password the pool currently connects with
    current_password: Mutex<Option<String>>,
    statements: Arc<Statements>,
}

impl PgSessionSource {
    /// Creates the pool without connecting; sessions are established lazily.
    pub fn new(cfg: &PostgresConfig) -> Result<Self> {
        let base_options = cfg.connect_options()?;
        let max_idle = cfg.max_idle_conns as usize;

        // The pool only exists after `connect_lazy_with`, so the release hook
        // looks it up through this cell.
        let pool_cell: Arc<OnceLock<PgPool>> = Arc::new(OnceLock::new());
        let hook_cell = pool_cell.clone();

        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_open_conns)
            .min_connections(0)
            .acquire_timeout(cfg.connect_timeout())
            .after_release(move |_conn, _meta| {
                let keep = hook_cell.get().map(|pool| pool.num_idle() < max_idle).unwrap_or(true);
                Box::pin(async move { Ok(keep) })
            })
            .connect_lazy_with(base_options.clone());
        let _ = pool_cell.set(pool.clone());

        info!("PostgreSQL endpoint: {}", cfg.endpoint());

        let password_file = if cfg.password_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&cfg.password_file))
        };

        Ok(Self {
            pool,
            base_options,
            password_file,
            current_password: Mutex::new(None),
            statements: Arc::new(Statements::new(&cfg.table)),
        })
    }

    /// Re-reads the password file and points the pool at the new password
    /// if it changed.
    pub(crate) async fn refresh_credentials(&self) -> std::result::Result<PgConnectOptions, StorageError> {
        let Some(path) = &self.password_file else {
            return Ok(self.base_options.clone());
        };

        debug!("Re-reading password before establishing new sessions...");
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StorageError::PasswordFile {
                path: path.display().to_string(),
                source,
            })?;
        let password = content.trim_end_matches(['\n', '\r']).to_string();
        let options = self.base_options.clone().password(&password);

        let mut current = self.current_password.lock();
        if current.as_deref() != Some(password.as_str()) {
            if current.is_some() {
                info!("PostgreSQL password changed, new sessions use the updated credentials");
            }
            self.pool.set_connect_options(options.clone());
            *current = Some(password);
        }
        Ok(options)
    }

    /// A session outside the write pool, for state that must outlive any
    /// single batch (advisory locks).
    pub async fn dedicated_connection(&self) -> std::result::Result<PgConnection, StorageError> {
        let options = self.refresh_credentials().await?;
        PgConnection::connect_with(&options)
            .await
            .map_err(StorageError::Acquire)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SessionSource for PgSessionSource {
    async fn acquire(&self) -> std::result::Result<Box<dyn IngestSession>, StorageError> {
        self.refresh_credentials().await?;
        let conn = self.pool.acquire().await.map_err(StorageError::Acquire)?;
        Ok(Box::new(PgIngestSession {
            conn: Some(conn),
            statements: self.statements.clone(),
        }))
    }

    async fn ping(&self) -> std::result::Result<(), StorageError> {
        self.refresh_credentials().await?;
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::HealthCheck)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "PostgreSQL"
    }
}

/// One pooled connection reserved for a single batch
pub(crate) struct PgIngestSession {
    conn: Option<PoolConnection<Postgres>>,
    statements: Arc<Statements>,
}

impl PgIngestSession {
    fn conn(
        &mut self,
        phase: WritePhase,
    ) -> std::result::Result<&mut PgConnection, StorageError> {
        match self.conn.as_mut() {
            Some(conn) => Ok(&mut **conn),
            None => Err(StorageError::Phase {
                phase,
                source: sqlx::Error::PoolClosed,
            }),
        }
    }
}

fn phase_error(phase: WritePhase) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |source| StorageError::Phase { phase, source }
}

/// Runs `sql` in its own transaction; an uncommitted transaction rolls back
/// when dropped.
async fn execute_in_transaction(
    conn: &mut PgConnection,
    sql: &str,
) -> std::result::Result<u64, sqlx::Error> {
    let mut tx = conn.begin().await?;
    let done = (&mut *tx).execute(sqlx::raw_sql(sql)).await?;
    tx.commit().await?;
    Ok(done.rows_affected())
}

#[async_trait]
impl IngestSession for PgIngestSession {
    async fn create_staging(&mut self) -> std::result::Result<(), StorageError> {
        let statements = self.statements.clone();
        let conn = self.conn(WritePhase::CreateStaging)?;
        conn.execute(sqlx::raw_sql(&statements.create_staging))
            .await
            .map_err(phase_error(WritePhase::CreateStaging))?;
        Ok(())
    }

    async fn bulk_load(
        &mut self,
        rows: &[StagedRow],
    ) -> std::result::Result<(), StorageError> {
        let statements = self.statements.clone();
        let conn = self.conn(WritePhase::BulkLoad)?;
        let mut copy = conn
            .copy_in_raw(&statements.copy_staging)
            .await
            .map_err(phase_error(WritePhase::BulkLoad))?;

        let mut chunk = String::with_capacity(COPY_CHUNK_BYTES);
        for row in rows {
            row.write_copy_line(&mut chunk);
            if chunk.len() >= COPY_CHUNK_BYTES {
                let data = std::mem::replace(&mut chunk, String::with_capacity(COPY_CHUNK_BYTES));
                let sent = copy.send(data.into_bytes()).await.map(|_| ());
                if let Err(e) = sent {
                    let _ = copy.abort("staging copy failed").await;
                    return Err(phase_error(WritePhase::BulkLoad)(e));
                }
            }
        }
        if !chunk.is_empty() {
            let sent = copy.send(chunk.into_bytes()).await.map(|_| ());
            if let Err(e) = sent {
                let _ = copy.abort("staging copy failed").await;
                return Err(phase_error(WritePhase::BulkLoad)(e));
            }
        }

        let copied = copy.finish().await.map_err(phase_error(WritePhase::BulkLoad))?;
        debug!("Copied {} rows into staging", copied);
        Ok(())
    }

    async fn insert_labels(&mut self) -> std::result::Result<u64, StorageError> {
        let statements = self.statements.clone();
        let conn = self.conn(WritePhase::InsertLabels)?;
        execute_in_transaction(conn, &statements.insert_labels)
            .await
            .map_err(phase_error(WritePhase::InsertLabels))
    }

    async fn insert_values(&mut self) -> std::result::Result<u64, StorageError> {
        let statements = self.statements.clone();
        let conn = self.conn(WritePhase::InsertValues)?;
        execute_in_transaction(conn, &statements.insert_values)
            .await
            .map_err(phase_error(WritePhase::InsertValues))
    }

    async fn release(mut self: Box<Self>) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match (&mut *conn)
            .execute(sqlx::raw_sql(&self.statements.drop_staging))
            .await
        {
            Ok(_) => drop(conn),
            Err(e) => {
                error!("Failed to clean up staging table, closing session: {}", e);
                if let Err(e) = conn.detach().close().await {
                    debug!("Closing session failed: {}", e);
                }
            }
        }
    }
}

impl Drop for PgIngestSession {
    fn drop(&mut self) {
        // Abandoned before release: the staging table may still exist, so the
        // connection is closed rather than returned to the pool.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}
