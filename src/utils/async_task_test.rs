use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::utils::async_task::retry_with_fixed_delay;
use crate::Error;
use crate::StorageError;

type Attempt = Pin<Box<dyn Future<Output = crate::Result<u32>>>>;

/// Task failing its first `failures` attempts
fn flaky(failures: u32) -> (Arc<AtomicU32>, impl Fn() -> Attempt) {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();
    let task = move || {
        let counter = counter_clone.clone();
        Box::pin(async move {
            let current = counter.fetch_add(1, Ordering::SeqCst);
            if current < failures {
                Err(Error::Fatal(format!("attempt {current} fails")))
            } else {
                Ok(current)
            }
        }) as Attempt
    };
    (counter, task)
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_failures() {
    let (counter, task) = flaky(2);

    let result = retry_with_fixed_delay(task, 3, Duration::from_secs(5)).await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_means_one_attempt() {
    let (counter, task) = flaky(1);

    let e = retry_with_fixed_delay(task, 0, Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(
        e,
        Error::Storage(StorageError::ConnectRetriesExhausted { attempts: 1 })
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waits_fixed_delay_between_attempts() {
    let (counter, task) = flaky(u32::MAX);
    let start = tokio::time::Instant::now();

    let e = retry_with_fixed_delay(task, 2, Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(
        e,
        Error::Storage(StorageError::ConnectRetriesExhausted { attempts: 3 })
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    // Two sleeps, none after the last attempt
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(start.elapsed() < Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_retries_do_not_overflow() {
    let (counter, task) = flaky(0);

    let result = retry_with_fixed_delay(task, usize::MAX, Duration::from_secs(5)).await;

    assert_eq!(result.unwrap(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
