//! Leadership through a PostgreSQL session-scoped advisory lock.
//!
//! The lock lives on a dedicated session opened outside the write pool and is
//! held for as long as that session stays open. Losing the session loses the
//! lock, so a failed check discards the session and the next check starts
//! from a fresh one.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgConnection;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Election;
use crate::ElectionError;
use crate::PgSessionSource;
use crate::Result;
use crate::StorageError;

/// Session holding (or competing for) the lock
#[async_trait]
pub trait LockSession: Send + 'static {
    /// Non-blocking acquisition; `false` when held by another session
    async fn try_lock(
        &mut self,
        lock_id: i64,
    ) -> std::result::Result<bool, sqlx::Error>;

    /// Round trip proving the session, and with it the lock, is still alive
    async fn probe(&mut self) -> std::result::Result<(), sqlx::Error>;

    /// `false` when this session did not hold the lock
    async fn unlock(
        &mut self,
        lock_id: i64,
    ) -> std::result::Result<bool, sqlx::Error>;
}

#[async_trait]
pub trait LockConnector: Send + Sync + 'static {
    type Session: LockSession;

    async fn connect(&self) -> std::result::Result<Self::Session, StorageError>;
}

#[async_trait]
impl LockSession for PgConnection {
    async fn try_lock(
        &mut self,
        lock_id: i64,
    ) -> std::result::Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
            .bind(lock_id)
            .fetch_one(self)
            .await
    }

    async fn probe(&mut self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self).await.map(|_| ())
    }

    async fn unlock(
        &mut self,
        lock_id: i64,
    ) -> std::result::Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(lock_id)
            .fetch_one(self)
            .await
    }
}

#[async_trait]
impl LockConnector for PgSessionSource {
    type Session = PgConnection;

    async fn connect(&self) -> std::result::Result<PgConnection, StorageError> {
        self.dedicated_connection().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LockStatus {
    Follower,
    Leader,
    /// The last check failed and none succeeded since
    Failed(String),
}

pub type PgAdvisoryLock = AdvisoryLock<PgSessionSource>;

pub struct AdvisoryLock<C: LockConnector> {
    lock_id: i64,
    connector: Arc<C>,
    session: Mutex<Option<C::Session>>,
    status: RwLock<LockStatus>,
}

impl<C: LockConnector> AdvisoryLock<C> {
    pub fn new(
        lock_id: i64,
        connector: Arc<C>,
    ) -> Self {
        Self {
            lock_id,
            connector,
            session: Mutex::new(None),
            status: RwLock::new(LockStatus::Follower),
        }
    }

    pub(crate) fn status(&self) -> LockStatus {
        self.status.read().clone()
    }

    fn set_status(
        &self,
        next: LockStatus,
    ) {
        let mut status = self.status.write();
        if *status != next {
            debug!(lock_id = self.lock_id, "advisory lock status {:?} -> {:?}", *status, next);
        }
        *status = next;
    }
}

#[async_trait]
impl<C: LockConnector> Election for AdvisoryLock<C> {
    fn id(&self) -> String {
        self.lock_id.to_string()
    }

    async fn become_leader(&self) -> Result<bool> {
        let mut slot = self.session.lock().await;

        let mut session = match slot.take() {
            Some(session) => session,
            None => match self.connector.connect().await {
                Ok(session) => session,
                Err(source) => {
                    self.set_status(LockStatus::Failed(source.to_string()));
                    return Err(ElectionError::Connect {
                        lock_id: self.lock_id,
                        source,
                    }
                    .into());
                }
            },
        };

        // Re-acquiring a held session lock would stack it, so a leader
        // only checks that its session is alive.
        let checked = if self.status() == LockStatus::Leader {
            session.probe().await.map(|_| true)
        } else {
            session.try_lock(self.lock_id).await
        };

        match checked {
            Ok(leader) => {
                *slot = Some(session);
                self.set_status(if leader {
                    LockStatus::Leader
                } else {
                    LockStatus::Follower
                });
                Ok(leader)
            }
            Err(source) => {
                // Dropping the session releases whatever it held
                drop(session);
                self.set_status(LockStatus::Failed(source.to_string()));
                Err(ElectionError::LockSession {
                    lock_id: self.lock_id,
                    source,
                }
                .into())
            }
        }
    }

    async fn is_leader(&self) -> Result<bool> {
        match self.status() {
            LockStatus::Leader => Ok(true),
            LockStatus::Follower => Ok(false),
            LockStatus::Failed(reason) => Err(ElectionError::CheckFailed {
                lock_id: self.lock_id,
                reason,
            }
            .into()),
        }
    }

    async fn resign(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        let was_leader = self.status() == LockStatus::Leader;
        self.set_status(LockStatus::Follower);
        if !was_leader {
            return Ok(());
        }

        let Some(session) = slot.as_mut() else {
            return Ok(());
        };
        match session.unlock(self.lock_id).await {
            Ok(true) => {
                info!(lock_id = self.lock_id, "advisory lock released");
                Ok(())
            }
            Ok(false) => {
                warn!(lock_id = self.lock_id, "advisory lock was not held on release");
                Err(ElectionError::NotHeld(self.lock_id).into())
            }
            Err(source) => {
                // Closing the session is the only other way to let go
                slot.take();
                Err(ElectionError::Release {
                    lock_id: self.lock_id,
                    source,
                }
                .into())
            }
        }
    }
}
