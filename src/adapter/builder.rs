//! Assembles an [`Adapter`] from configuration.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let adapter = AdapterBuilder::new(config, shutdown_rx).build().await?;
//! adapter.run().await?;
//! ```
//!
//! `build()` validates the configuration first, so configuration errors
//! surface before the store is contacted. It then waits for the store (with
//! the configured fixed-delay retries) and spawns the periodic tasks.

use std::sync::Arc;

use prometheus::Registry;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use super::Adapter;
use crate::constants::THROUGHPUT_TICK_INTERVAL;
use crate::utils::async_task::retry_with_fixed_delay;
use crate::AdapterConfig;
use crate::AdapterMetrics;
use crate::AppState;
use crate::BatchWriter;
use crate::Election;
use crate::ElectionBackend;
use crate::Elector;
use crate::Error;
use crate::ExternalDecision;
use crate::LivenessTracker;
use crate::PgAdvisoryLock;
use crate::PgSessionSource;
use crate::Result;
use crate::ScheduledElector;
use crate::SessionSource;
use crate::ThroughputCalc;
use crate::WriteCoordinator;
use crate::REGISTRY;

pub struct AdapterBuilder {
    config: AdapterConfig,
    registry: Registry,
    shutdown_signal: watch::Receiver<()>,
}

impl AdapterBuilder {
    pub fn new(
        config: AdapterConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry: REGISTRY.clone(),
            shutdown_signal,
        }
    }

    /// Registers the adapter's collectors into `registry` instead of the
    /// process-wide one.
    pub fn registry(
        mut self,
        registry: Registry,
    ) -> Self {
        self.registry = registry;
        self
    }

    pub async fn build(self) -> Result<Adapter> {
        let Self {
            config,
            registry,
            shutdown_signal,
        } = self;

        let config = config.validate()?;
        let backend = config.election.backend()?;
        let telemetry_segment = config.web.telemetry_segment();
        let metrics = AdapterMetrics::registered(&registry)?;

        let source = Arc::new(PgSessionSource::new(&config.postgres)?);
        retry_with_fixed_delay(
            || {
                let source = source.clone();
                async move { source.ping().await.map_err(Error::from) }
            },
            config.postgres.db_connect_retries,
            config.postgres.connect_retry_delay(),
        )
        .await
        .map_err(|e| Error::Fatal(format!("database unreachable at startup: {e}")))?;
        info!("Connected to {}", config.postgres.endpoint());

        let writer = Arc::new(BatchWriter::new(source.clone(), config.postgres.log_samples));
        let liveness = Arc::new(LivenessTracker::new());
        let throughput = ThroughputCalc::new(THROUGHPUT_TICK_INTERVAL);

        let mut handles = vec![throughput.spawn(shutdown_signal.clone())];

        let (elector, external) = match backend {
            ElectionBackend::Disabled => (None, None),
            ElectionBackend::AdvisoryLock {
                lock_id,
                interval,
                idle_timeout,
            } => {
                info!(lock_id, "Leader election with advisory lock, every {:?}", interval);
                let lock = Arc::new(PgAdvisoryLock::new(lock_id, source.clone()));
                let scheduled = ScheduledElector::new(lock.clone(), interval);
                handles.push(scheduled.spawn(shutdown_signal.clone()));
                match idle_timeout {
                    Some(timeout) => handles.push(scheduled.spawn_liveness_monitor(
                        liveness.clone(),
                        timeout,
                        shutdown_signal.clone(),
                    )),
                    None => warn!("Idle resignation disabled, an instance without traffic keeps the lock"),
                }
                (Some(Elector::new(lock)), None)
            }
            ElectionBackend::ExternalDecision => {
                let decision = Arc::new(ExternalDecision::new());
                info!(id = %decision.id(), "Leader election through /admin/leader, starting as follower");
                (Some(Elector::new(decision.clone())), Some(decision))
            }
        };

        let coordinator = WriteCoordinator::new(elector, liveness, metrics.clone(), throughput);
        let state = Arc::new(AppState {
            coordinator,
            writer: writer.clone(),
            health: writer,
            metrics,
            registry,
            external,
        });

        Ok(Adapter {
            state,
            source,
            listen_address: config.web.listen_address,
            telemetry_segment,
            handles,
            shutdown_signal,
        })
    }
}
