//! Timer-driven election with idle resignation.
//!
//! One task re-runs the election every `interval`. A second task watches the
//! time since the last inbound batch: once it exceeds the idle timeout the
//! election is paused and leadership released, so an instance that stopped
//! receiving traffic cannot keep the lock. The pause lifts as soon as batches
//! arrive again.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Election;
use crate::constants::LIVENESS_CHECK_INTERVAL;
use crate::LivenessTracker;
use crate::Result;

pub struct ScheduledElector {
    election: Arc<dyn Election>,
    interval: Duration,
    paused: AtomicBool,
    /// Outcome of the last successful tick, for transition logs
    leading: AtomicBool,
    /// Serializes ticks with idle resignation so a tick already past the
    /// pause check cannot re-acquire right after a resign.
    turn: Mutex<()>,
}

impl ScheduledElector {
    pub fn new(
        election: Arc<dyn Election>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            election,
            interval,
            paused: AtomicBool::new(false),
            leading: AtomicBool::new(false),
            turn: Mutex::new(()),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// One election round. Paused rounds report follower without touching
    /// the backend.
    pub async fn run_election(&self) -> Result<bool> {
        let _turn = self.turn.lock().await;
        if self.is_paused() {
            debug!("election paused, not competing");
            return Ok(false);
        }

        let result = self.election.become_leader().await;
        let leader = matches!(result, Ok(true));
        let was_leading = self.leading.swap(leader, Ordering::AcqRel);
        if leader && !was_leading {
            info!(id = %self.election.id(), "became leader");
        } else if !leader && was_leading {
            warn!(id = %self.election.id(), "lost leadership");
        }
        result
    }

    /// Pauses and resigns when `idle` exceeds `timeout`, resumes otherwise.
    pub async fn liveness_check(
        &self,
        idle: Duration,
        timeout: Duration,
    ) {
        if idle > timeout {
            let _turn = self.turn.lock().await;
            if !self.paused.swap(true, Ordering::AcqRel) {
                warn!(
                    "No batches received for {:?} (timeout {:?}), pausing election and resigning",
                    idle, timeout
                );
            }
            self.leading.store(false, Ordering::Release);
            if let Err(e) = self.election.resign().await {
                warn!("Resigning after idle timeout failed: {}", e);
            }
        } else if self.paused.swap(false, Ordering::AcqRel) {
            info!("Batches are arriving again, resuming election");
        }
    }

    /// Runs the election on its interval until shutdown, then resigns.
    pub fn spawn(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let elector = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(elector.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match elector.run_election().await {
                            Ok(leader) => debug!(leader, "scheduled election"),
                            Err(e) => error!("Scheduled election failed: {}", e),
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("election task stopped");
                        break;
                    }
                }
            }
            if let Err(e) = elector.election.resign().await {
                warn!("Resigning on shutdown failed: {}", e);
            }
        })
    }

    /// Checks `liveness` against `timeout` every second until shutdown.
    pub fn spawn_liveness_monitor(
        self: &Arc<Self>,
        liveness: Arc<LivenessTracker>,
        timeout: Duration,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let elector = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LIVENESS_CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        elector.liveness_check(liveness.idle(), timeout).await;
                    }
                    _ = shutdown.changed() => {
                        debug!("liveness monitor stopped");
                        return;
                    }
                }
            }
        })
    }
}
