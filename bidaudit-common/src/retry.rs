//! Retry policy for idempotent outbound calls
//!
//! A policy is max retries + backoff function; the caller supplies the
//! retryable-error predicate per call site.
//!
//! **Algorithm:**
//! 1. Attempt operation
//! 2. If successful, return result
//! 3. If the error is retryable and retries remain: log WARN, back off, retry
//! 4. Otherwise return the error (non-retryable errors fail immediately)

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Same delay before every retry
    Fixed(Duration),
    /// n-th retry waits `n * step`
    Linear(Duration),
    /// n-th retry waits `initial * 2^(n-1)`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(step) => step.saturating_mul(retry),
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retry)
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Three retries with 1 s linear backoff
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn linear(max_retries: u32, step: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear(step),
        }
    }

    /// Single attempt, never retried
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::None,
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or retries are exhausted. The closure receives the 1-based attempt number.
    pub async fn run<F, Fut, T, E, P>(
        &self,
        operation_name: &str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !is_retryable(&err) {
                        return Err(err);
                    }
                    if attempt > self.max_retries {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            error = %err,
                            "Operation failed: retries exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.backoff.delay(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, will retry after backoff"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
