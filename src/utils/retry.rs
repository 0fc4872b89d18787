use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed backoff schedule.
///
/// `backoff[i]` is the pause after failed attempt `i`; attempts past the end of
/// the schedule reuse its last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff_secs: &[u64]) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: backoff_secs.iter().copied().map(Duration::from_secs).collect(),
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            backoff: Vec::new(),
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let idx = (attempt as usize).min(self.backoff.len() - 1);
        self.backoff[idx]
    }
}

/// Runs `op` until it succeeds, returns a non-retryable error, or the policy
/// runs out of attempts. The last error is returned on exhaustion.
pub async fn retry_async<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let last = attempt + 1 >= attempts;
                if last || !is_retryable(&err) {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "{label}: attempt {}/{} failed ({err}); retrying in {:?}",
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
