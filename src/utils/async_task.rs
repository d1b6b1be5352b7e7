use std::time::Duration;

use tokio::time::sleep;
use tracing::info;
use tracing::warn;

use crate::Result;
use crate::StorageError;

/// Runs `task` up to `retries + 1` times with a fixed `delay` between
/// attempts. Returns the first success, or
/// [`StorageError::ConnectRetriesExhausted`] once every attempt failed.
pub(crate) async fn retry_with_fixed_delay<F, T, P>(
    task: F,
    retries: usize,
    delay: Duration,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let attempts = retries.saturating_add(1);
    for attempt in 1..=attempts {
        match task().await {
            Ok(r) => return Ok(r),
            Err(e) => {
                warn!("attempt {}/{} failed: {}", attempt, attempts, e);
                if attempt < attempts {
                    info!("retrying in {:?}", delay);
                    sleep(delay).await;
                }
            }
        }
    }
    Err(StorageError::ConnectRetriesExhausted { attempts }.into())
}
