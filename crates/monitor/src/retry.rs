//! Bounded exponential-backoff retry for collaborator calls.
//!
//! Collaborators are idempotent, so a transient failure is retried in place
//! a few times before the monitor gives up on the cycle. Permanent failures
//! are returned immediately.

use std::future::Future;
use std::time::Duration;

use delaywatch_core::activities::ActivityError;
use tokio_util::sync::CancellationToken;

/// Tunable parameters for the backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay, clamped to [`RetryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts, or
/// `cancel` fires during a backoff wait. The last error is returned.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    activity: &'static str,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ActivityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            tracing::warn!(activity, attempt, error = %error, "Activity failed, giving up");
            return Err(error);
        }

        tracing::warn!(
            activity,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Activity attempt failed, retrying",
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(error),
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, policy);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn next_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(next_delay(Duration::from_secs(1), &policy), Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(next_delay(Duration::from_secs(8), &policy), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(
            &RetryPolicy::default(),
            "test",
            &CancellationToken::new(),
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ActivityError::Transient("flaky".into()))
                } else {
                    Ok(7)
                }
            },
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(
            &RetryPolicy::default(),
            "test",
            &CancellationToken::new(),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ActivityError::Transient("down".into()))
            },
        )
        .await;

        assert_eq!(result, Err(ActivityError::Transient("down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(
            &RetryPolicy::default(),
            "test",
            &CancellationToken::new(),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ActivityError::Permanent("bad key".into()))
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryPolicy::default(), "test", &cancel, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ActivityError::Transient("down".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
