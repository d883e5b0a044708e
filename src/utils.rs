use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{error::DeliveryError, models::retry::RetryPolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

/// Runs `operation` until it succeeds, fails terminally, or the retry budget
/// is spent. Only errors with `is_retryable()` are attempted again.
///
/// The operation receives the zero-based attempt number.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<RetryOutcome<T>, DeliveryError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, DeliveryError>>,
{
    let mut attempt = 0;
    let mut delays = Vec::new();

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        attempt,
                        max_retries = policy.max_retries,
                        "Retry succeeded"
                    );
                }
                return Ok(RetryOutcome {
                    value,
                    attempts: attempt + 1,
                    delays,
                });
            }
            Err(e) if !e.is_retryable() => {
                warn!(attempt, error = %e, "Terminal failure, not retrying");
                return Err(e);
            }
            Err(e) => {
                if attempt >= policy.max_retries {
                    warn!(
                        max_retries = policy.max_retries,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(exhausted(e, attempt + 1));
                }

                let delay = policy.delay_for(attempt);

                debug!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retry attempt failed, backing off"
                );

                sleep(delay).await;
                delays.push(delay);
                attempt += 1;
            }
        }
    }
}

fn exhausted(error: DeliveryError, attempts: u32) -> DeliveryError {
    match error {
        DeliveryError::UnexpectedStatus {
            endpoint_id,
            status,
        } => DeliveryError::RetriesExhausted {
            endpoint_id,
            attempts,
            last_status: status,
        },
        other => other,
    }
}
