//! Fixed-schedule retry for the write path (SS4.4 step 7): three
//! attempts total, backing off 0.5s, 1s, 2s between them. Unlike the
//! jittered exponential backoff used elsewhere in the ambient stack,
//! the persistence write path uses a fixed schedule because each retry
//! re-runs a whole transaction and the schedule is explicitly specified.

use std::time::Duration;

use tracing::warn;

use crate::error::PersistenceError;

const BACKOFF_SCHEDULE_MS: [u64; 3] = [500, 1000, 2000];

pub async fn with_fixed_backoff<T, F, Fut>(operation: &str, op: F) -> Result<T, PersistenceError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, PersistenceError>>,
{
    let mut last_error = None;

    for (attempt, delay_ms) in BACKOFF_SCHEDULE_MS.iter().enumerate() {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                warn!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms,
                    error = %e,
                    "persistence write failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    match last_error {
        Some(e) => Err(PersistenceError::RetriesExhausted {
            attempts: BACKOFF_SCHEDULE_MS.len() as u32 + 1,
            source: Box::new(e),
        }),
        None => unreachable!("loop always executes at least one attempt"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, PersistenceError> = with_fixed_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_errors_short_circuit() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, PersistenceError> = with_fixed_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PersistenceError::UnknownTool("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
