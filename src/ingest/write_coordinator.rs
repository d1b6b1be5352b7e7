//! Leadership-gated hand-off of decoded batches to a [`Writer`].
//!
//! Every batch refreshes the liveness timestamp first, whether or not it is
//! written. Without an [`Elector`] every batch is written.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::AdapterMetrics;
use crate::Elector;
use crate::Error;
use crate::LivenessTracker;
use crate::Result;
use crate::Sample;
use crate::ThroughputCalc;
use crate::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Handed to the writer, which accepted it
    Written,
    /// Dropped because this instance is not the leader
    NotLeader,
}

pub struct WriteCoordinator {
    elector: Option<Elector>,
    liveness: Arc<LivenessTracker>,
    metrics: AdapterMetrics,
    throughput: Arc<ThroughputCalc>,
}

impl WriteCoordinator {
    pub fn new(
        elector: Option<Elector>,
        liveness: Arc<LivenessTracker>,
        metrics: AdapterMetrics,
        throughput: Arc<ThroughputCalc>,
    ) -> Self {
        if elector.is_none() {
            warn!(
                "No leader election configured. Every instance writes, running several can \
                 duplicate data"
            );
        }
        Self {
            elector,
            liveness,
            metrics,
            throughput,
        }
    }

    /// Gates `samples` on leadership and writes them.
    ///
    /// A failed leadership check aborts before any counter is touched. A
    /// failed write is counted in `failed_samples_total` and returned.
    pub async fn send_samples(
        &self,
        writer: &dyn Writer,
        samples: &[Sample],
    ) -> Result<WriteOutcome> {
        self.liveness.touch();

        if let Some(elector) = &self.elector {
            if !elector.is_leader().await? {
                debug!(
                    id = %elector.id(),
                    count = samples.len(),
                    "Not the leader, dropping batch"
                );
                return Ok(WriteOutcome::NotLeader);
            }
        }

        let remote = writer.name();
        let count = samples.len() as f64;
        let begin = Instant::now();
        match writer.write(samples).await {
            Ok(()) => {
                self.metrics.sent_samples.with_label_values(&[remote.as_str()]).inc_by(count);
                self.metrics
                    .sent_batch_duration
                    .with_label_values(&[remote.as_str()])
                    .observe(begin.elapsed().as_secs_f64());
                Ok(WriteOutcome::Written)
            }
            Err(e) => {
                self.metrics.failed_samples.with_label_values(&[remote.as_str()]).inc_by(count);
                Err(e)
            }
        }
    }

    /// Request-level entry point: errors are logged, never surfaced, and the
    /// throughput calculator is fed with the sent counter.
    pub async fn handle_batch(
        &self,
        writer: &dyn Writer,
        samples: &[Sample],
    ) -> Option<WriteOutcome> {
        let outcome = match self.send_samples(writer, samples).await {
            Ok(outcome) => Some(outcome),
            Err(e @ Error::Election(_)) => {
                error!("Leadership check failed, batch not written: {}", e);
                None
            }
            Err(e) => {
                warn!(num_samples = samples.len(), "Error sending samples to remote storage: {}", e);
                None
            }
        };

        let remote = writer.name();
        let sent = self.metrics.sent_samples.with_label_values(&[remote.as_str()]).get();
        self.throughput.set_current(sent);
        if let Some(rate) = self.throughput.take_rate() {
            info!(samples_per_sec = rate, "Samples write throughput");
        }

        outcome
    }
}
