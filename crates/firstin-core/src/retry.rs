//! Retry decorator for job fetchers.
//!
//! Wraps any [`JobFetcher`] with exponential backoff and jitter on transient
//! failures. Server-requested Retry-After delays take precedence over the
//! computed backoff, and every backoff sleep is interruptible by
//! cancellation.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::PollError;
use crate::job::Job;
use crate::traits::JobFetcher;

/// Configuration for [`RetryFetcher`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(5),
        }
    }
}

/// A [`JobFetcher`] wrapper that retries transient failures.
///
/// Retryable: network errors, timeouts, HTTP 429 and 5xx. Everything else
/// (other 4xx, parse failures, cancellation) surfaces immediately.
#[derive(Clone)]
pub struct RetryFetcher<F> {
    inner: F,
    config: RetryConfig,
}

impl<F: JobFetcher> RetryFetcher<F> {
    pub fn new(inner: F, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Backoff for a 1-indexed attempt: base × 2^(attempt−1), scaled by a
    /// uniform jitter factor in [0.7, 1.3]. A server-requested Retry-After
    /// on the triggering error overrides the computation entirely.
    fn backoff_delay(&self, attempt: u32, err: &PollError) -> Duration {
        if let Some(retry_after) = err.retry_after() {
            return retry_after;
        }

        let exp = self.config.base_delay.as_millis() as u64 * (1u64 << (attempt - 1).min(16));
        Duration::from_millis((exp as f64 * jitter_factor()) as u64)
    }
}

impl<F: JobFetcher> JobFetcher for RetryFetcher<F> {
    async fn fetch_jobs(&self, cancel: CancellationToken) -> Result<Vec<Job>, PollError> {
        let mut last_err = match self.inner.fetch_jobs(cancel.clone()).await {
            Ok(jobs) => return Ok(jobs),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        for attempt in 1..=self.config.max_retries {
            let delay = self.backoff_delay(attempt, &last_err);
            tracing::warn!(
                attempt,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %last_err,
                "retrying after transient error"
            );

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(PollError::cancelled_after(last_err)),
            }

            match self.inner.fetch_jobs(cancel.clone()).await {
                Ok(jobs) => return Ok(jobs),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => last_err = err,
            }
        }

        Err(last_err)
    }
}

// ---------------------------------------------------------------------------
// Jitter from std: a clock-seeded xorshift avoids pulling in `rand`.
// ---------------------------------------------------------------------------

/// A uniformly-distributed factor in [0.7, 1.3].
fn jitter_factor() -> f64 {
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    0.7 + (x % 600) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::testutil::MockFetcher;

    fn quick_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
        }
    }

    fn transport(status: u16, retry_after: Option<Duration>) -> PollError {
        PollError::Transport {
            status,
            retry_after,
            message: format!("status {status}"),
        }
    }

    #[test]
    fn jitter_factor_is_bounded() {
        for _ in 0..100 {
            let f = jitter_factor();
            assert!((0.7..1.3).contains(&f), "factor out of range: {f}");
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_does_not_retry() {
        let inner = MockFetcher::with_jobs(vec![]);
        let fetcher = RetryFetcher::new(inner.clone(), quick_config(2));

        fetcher.fetch_jobs(CancellationToken::new()).await.unwrap();
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn exhaustion_makes_one_plus_n_attempts() {
        let inner = MockFetcher::always_failing(|| transport(503, None));
        let fetcher = RetryFetcher::new(inner.clone(), quick_config(2));

        let err = fetcher
            .fetch_jobs(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Transport { status: 503, .. }));
        assert_eq!(inner.call_count(), 3, "expected 1 initial + 2 retries");
    }

    #[tokio::test]
    async fn non_retryable_status_surfaces_immediately() {
        let inner = MockFetcher::always_failing(|| transport(404, None));
        let fetcher = RetryFetcher::new(inner.clone(), quick_config(2));

        let err = fetcher
            .fetch_jobs(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Transport { status: 404, .. }));
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn parse_error_is_never_retried() {
        let inner = MockFetcher::always_failing(|| PollError::Parse("bad json".into()));
        let fetcher = RetryFetcher::new(inner.clone(), quick_config(2));

        let err = fetcher
            .fetch_jobs(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Parse(_)));
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn retry_after_overrides_backoff() {
        let inner = MockFetcher::with_responses(vec![
            Err(transport(429, Some(Duration::from_millis(250)))),
            Ok(vec![]),
        ]);
        let fetcher = RetryFetcher::new(inner.clone(), quick_config(2));

        let start = Instant::now();
        fetcher.fetch_jobs(CancellationToken::new()).await.unwrap();
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(250),
            "retry fired before Retry-After elapsed: {elapsed:?}"
        );
        // Generous upper bound: the server delay plus one base tick of slack.
        assert!(
            elapsed < Duration::from_millis(600),
            "retry waited far longer than Retry-After: {elapsed:?}"
        );
        assert_eq!(inner.call_count(), 2);
    }

    #[tokio::test]
    async fn plain_network_error_is_retried() {
        let inner = MockFetcher::with_responses(vec![
            Err(PollError::Network("connection reset".into())),
            Ok(vec![]),
        ]);
        let fetcher = RetryFetcher::new(inner.clone(), quick_config(2));

        fetcher.fetch_jobs(CancellationToken::new()).await.unwrap();
        assert_eq!(inner.call_count(), 2);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_wraps_cause() {
        let inner = MockFetcher::always_failing(|| transport(503, None));
        let fetcher = RetryFetcher::new(
            inner.clone(),
            RetryConfig {
                max_retries: 2,
                base_delay: Duration::from_secs(60),
            },
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = fetcher.fetch_jobs(cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        match err {
            PollError::Cancelled { cause: Some(cause) } => {
                assert!(matches!(*cause, PollError::Transport { status: 503, .. }));
            }
            other => panic!("expected cancellation with cause, got {other:?}"),
        }
        assert_eq!(inner.call_count(), 1);
    }
}
