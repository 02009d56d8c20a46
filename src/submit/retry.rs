// src/submit/retry.rs

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::{BatchdagError, Result};

/// Bounded exponential backoff around an unreliable operation.
///
/// Attempt `n` (0-based) that fails transiently is followed by a pause of
/// `min(initial_delay * multiplier^n, max_delay)`. After `max_retries`
/// retries the last error is surfaced as [`BatchdagError::RetryExhausted`].
/// Non-transient errors (see [`BatchdagError::is_transient`]) are returned
/// immediately. A pause is cut short by the run's cancellation token or
/// deadline, which end the retries with `Cancelled` or `DeadlineExceeded`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 8,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(600),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retries without pausing. Handy in tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Pause after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.max_retries {
                return Err(BatchdagError::RetryExhausted {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    last_error: err.to_string(),
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "operation failed; retrying"
            );
            let out_of_time = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(BatchdagError::Cancelled),
                _ = out_of_time => return Err(BatchdagError::DeadlineExceeded),
            }
            attempt += 1;
        }
    }
}
