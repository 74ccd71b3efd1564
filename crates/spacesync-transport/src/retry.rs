//! Bounded retry for transient failures

use spacesync_core::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `op` up to `max_retries + 1` times.
///
/// Only errors for which `Error::is_retryable` holds are retried; the delay
/// doubles after every attempt.
pub async fn retry<T, F, Fut>(max_retries: u32, initial_backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(attempt, max_retries, error = %e, "Retrying request");
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
