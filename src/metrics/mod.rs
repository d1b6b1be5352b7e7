//! Prometheus instrumentation of the write path.
//!
//! Collectors are plain values owned by [`AdapterMetrics`] and registered into
//! a [`Registry`]; the process-wide [`REGISTRY`] backs the telemetry endpoint
//! while tests use their own registries.


use lazy_static::lazy_static;
use prometheus::Counter;
use prometheus::CounterVec;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::warn;

use crate::Result;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
}

#[derive(Clone)]
pub struct AdapterMetrics {
    pub received_samples: Counter,
    /// Labelled by destination name
    pub sent_samples: CounterVec,
    /// Labelled by destination name
    pub failed_samples: CounterVec,
    /// Seconds, labelled by destination name
    pub sent_batch_duration: HistogramVec,
    /// Milliseconds, labelled by route
    pub http_request_duration: HistogramVec,
}

impl AdapterMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            received_samples: Counter::with_opts(Opts::new(
                "received_samples_total",
                "Total number of received samples.",
            ))?,
            sent_samples: CounterVec::new(
                Opts::new(
                    "sent_samples_total",
                    "Total number of processed samples sent to remote storage.",
                ),
                &["remote"],
            )?,
            failed_samples: CounterVec::new(
                Opts::new(
                    "failed_samples_total",
                    "Total number of processed samples which failed on send to remote storage.",
                ),
                &["remote"],
            )?,
            sent_batch_duration: HistogramVec::new(
                HistogramOpts::new(
                    "sent_batch_duration_seconds",
                    "Duration of sample batch send calls to the remote storage.",
                ),
                &["remote"],
            )?,
            http_request_duration: HistogramVec::new(
                HistogramOpts::new("http_request_duration_ms", "Duration of HTTP request in milliseconds"),
                &["path"],
            )?,
        })
    }

    pub fn register(
        &self,
        registry: &Registry,
    ) -> Result<()> {
        registry.register(Box::new(self.received_samples.clone()))?;
        registry.register(Box::new(self.sent_samples.clone()))?;
        registry.register(Box::new(self.failed_samples.clone()))?;
        registry.register(Box::new(self.sent_batch_duration.clone()))?;
        registry.register(Box::new(self.http_request_duration.clone()))?;
        Ok(())
    }

    /// Creates the collectors and registers them into `registry`.
    pub fn registered(registry: &Registry) -> Result<Self> {
        let metrics = Self::new()?;
        metrics.register(registry)?;
        Ok(metrics)
    }
}

/// Text exposition of everything gathered by `registry`
pub fn encode_metrics(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!("could not encode metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
