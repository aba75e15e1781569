//! Retry with exponential backoff.
//!
//! Attempt `n` (0-based) that fails with a retryable error is followed by a
//! sleep of `base * 2^n` before attempt `n + 1`. No sleep follows the last
//! attempt.

use std::future::Future;
use std::time::Duration;

/// Attempt budget and base delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: u32,
    pub base: Duration,
}

impl Backoff {
    pub fn new(attempts: u32, base: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base,
        }
    }

    /// Delay slept after failed attempt `attempt` (0-based). Capped at 2^5.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * (1u32 << attempt.min(5))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(
    backoff: Backoff,
    what: &str,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt + 1 < backoff.attempts && retryable(&e) => {
                let delay = backoff.delay(attempt);
                tracing::warn!(
                    %what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP statuses worth retrying: rate limiting and server errors.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
