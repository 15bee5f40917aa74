//! Retry with exponential backoff for provider calls
//!
//! Cancellation is terminal: a cancelled attempt is never retried and the
//! backoff sleep itself is interruptible.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{GenError, GenResult};

/// Delay before retry `attempt` (1-based): 1s, 2s, 4s, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt - 1))
}

/// Run `operation` up to `max_attempts` times with exponential backoff
///
/// Returns the first success, `GenError::Cancelled` as soon as the token
/// fires, or the last attempt's error once attempts are exhausted.
pub async fn retry<F, Fut, T>(
    cancel: &CancellationToken,
    max_attempts: u32,
    mut operation: F,
) -> GenResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GenResult<T>>,
{
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(GenError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(GenError::Cancelled) => return Err(GenError::Cancelled),
            Err(err) => {
                warn!(attempt, max_attempts, error = %err, "provider call failed");
                last_error = Some(err);
                if attempt < max_attempts {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(GenError::Cancelled),
                        _ = tokio::time::sleep(backoff_delay(attempt)) => {}
                    }
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GenError::provider("all attempts failed")))
}
