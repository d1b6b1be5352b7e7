//! Time of the last inbound batch.
//!
//! Written by every write request and read by the idle-resignation monitor.
//! Stored as nanoseconds since the tracker was created so it fits in one
//! atomic and follows tokio's clock (paused time in tests).

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct LivenessTracker {
    origin: Instant,
    last_batch_nanos: AtomicU64,
}

impl LivenessTracker {
    /// Startup counts as the last observed batch.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_batch_nanos: AtomicU64::new(0),
        }
    }

    /// Records "now" as the time of the last received batch
    pub fn touch(&self) {
        let nanos = self.origin.elapsed().as_nanos() as u64;
        self.last_batch_nanos.store(nanos, Ordering::Release);
    }

    /// How long no batch has been received
    pub fn idle(&self) -> Duration {
        let last = Duration::from_nanos(self.last_batch_nanos.load(Ordering::Acquire));
        self.origin.elapsed().saturating_sub(last)
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new()
    }
}
