use std::{
    thread,
    time::{Duration, Instant},
};

use rand::Rng;
use tracing::{error, warn};

use crate::errors::BenchTrailError;

/// Bounded retry with exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Must be at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds up to 50% random delay on top of each backoff step.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before attempt `failed_attempt + 1`: `base * 2^(failed_attempt - 1)`, capped.
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(30);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = (delay.as_millis() / 2) as u64;
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, runs out of
/// attempts, or the next backoff would cross `deadline`.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    operation: &str,
    mut op: F,
) -> Result<T, BenchTrailError>
where
    F: FnMut(u32) -> Result<T, BenchTrailError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            error!(operation, attempt, "deadline exceeded");
            return Err(BenchTrailError::store_io(format!(
                "{operation}: deadline exceeded before attempt {attempt}"
            )));
        }
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= attempts => {
                error!(operation, attempts, "giving up: {err}");
                return Err(BenchTrailError::store_io(format!(
                    "{operation} failed after {attempts} attempts: {err}"
                )));
            }
            Err(err) => {
                let delay = policy.jittered(policy.backoff(attempt));
                if let Some(deadline) = deadline
                    && Instant::now() + delay >= deadline
                {
                    error!(operation, attempt, "backoff would cross the deadline: {err}");
                    return Err(BenchTrailError::store_io(format!(
                        "{operation}: deadline exceeded after {attempt} attempts: {err}"
                    )));
                }
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying: {err}"
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
