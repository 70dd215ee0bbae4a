use crate::migration::store::StoreError;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from `initial_backoff` and
    /// capped at `max_backoff`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached. `on_retry` sees
    /// each failure that will be retried. Returns the attempt count with the
    /// final error.
    pub fn run<T, F, R>(&self, mut op: F, mut on_retry: R) -> Result<T, (u32, StoreError)>
    where
        F: FnMut() -> Result<T, StoreError>,
        R: FnMut(u32, &StoreError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => return Err((attempt, err)),
                Err(err) => {
                    on_retry(attempt, &err);
                    let delay = self.backoff_after(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }
}
