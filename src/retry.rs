use anyhow::{anyhow, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Shared timeout/backoff policy injected into every adapter's network calls,
/// instead of per-adapter retry logic.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            per_attempt_timeout,
            backoff_base: Duration::from_millis(500),
        }
    }

    /// Run `f` up to `max_attempts` times, each attempt bounded by
    /// `per_attempt_timeout`, with linear backoff plus jitter between attempts.
    pub async fn run<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = anyhow!("{}: no attempts made", op);
        for attempt in 1..=self.max_attempts {
            match tokio::time::timeout(self.per_attempt_timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => last_err = e,
                Err(_) => {
                    last_err = anyhow!(
                        "{}: timed out after {:?}",
                        op,
                        self.per_attempt_timeout
                    )
                }
            }
            if attempt < self.max_attempts {
                let jitter = rand::thread_rng().gen_range(0..250);
                let delay = self.backoff_base * attempt + Duration::from_millis(jitter);
                warn!(
                    "{} attempt {}/{} failed: {} (retrying in {:?})",
                    op, attempt, self.max_attempts, last_err, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_err.context(format!("{}: all {} attempts failed", op, self.max_attempts)))
    }
}
