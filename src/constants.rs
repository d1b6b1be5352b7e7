use std::time::Duration;

// -
// Remote write

/// Label key carrying the metric name in a Prometheus label set
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Label text stored for series without any non-name labels
pub(crate) const EMPTY_LABELS: &str = "{}";

// -
// Periodic tasks

/// Throughput sampling period
pub(crate) const THROUGHPUT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Period of the idle-resignation check
pub(crate) const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

// -
// HTTP routes

pub(crate) const WRITE_PATH: &str = "write";
pub(crate) const HEALTH_PATH: &str = "healthz";
pub(crate) const ADMIN_PATH: &str = "admin";
pub(crate) const LEADER_PATH: &str = "leader";
