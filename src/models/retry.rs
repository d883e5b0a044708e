use std::time::Duration;

/// Backoff schedule for non-2xx responses.
///
/// Attempts are numbered from 0. After a failed attempt `n` the worker sleeps
/// `min(2^n * initial_delay, max_delay)`; `max_retries` retries follow the
/// first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
