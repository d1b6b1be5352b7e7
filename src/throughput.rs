//! Periodic rate sampler over a monotonic counter.
//!
//! Request handlers push the counter's current value; a ticking task turns the
//! delta since its previous tick into a per-second rate and drops it into a
//! single slot. A newer rate overwrites an unread one, so the ticking task
//! never waits on a consumer and nothing queues up.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub struct ThroughputCalc {
    tick_interval: Duration,
    /// f64 bits of the latest counter value
    current: AtomicU64,
    latest_rate: ArcSwapOption<f64>,
}

impl ThroughputCalc {
    pub fn new(tick_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            tick_interval,
            current: AtomicU64::new(0f64.to_bits()),
            latest_rate: ArcSwapOption::const_empty(),
        })
    }

    pub fn set_current(
        &self,
        value: f64,
    ) {
        self.current.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Takes the rate published by the last tick, if nobody took it yet.
    pub fn take_rate(&self) -> Option<f64> {
        self.latest_rate.swap(None).map(|rate| *rate)
    }

    /// Publishes the rate since `previous` and returns the new baseline.
    pub(crate) fn sample(
        &self,
        previous: f64,
    ) -> f64 {
        let current = f64::from_bits(self.current.load(Ordering::Relaxed));
        let rate = (current - previous) / self.tick_interval.as_secs_f64();
        self.latest_rate.store(Some(Arc::new(rate)));
        current
    }

    pub fn spawn(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let calc = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + calc.tick_interval,
                calc.tick_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous = f64::from_bits(calc.current.load(Ordering::Relaxed));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        previous = calc.sample(previous);
                    }
                    _ = shutdown.changed() => {
                        debug!("throughput calculator stopped");
                        return;
                    }
                }
            }
        })
    }
}
