//! Bounded retry with configurable spacing.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::{ClusterStageError, Result};
use crate::events::{self, EventSink, NoOpEventSink};

/// Backoff strategy for the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = interval (fixed spacing)
    #[default]
    Constant,
    /// delay = interval * failed_attempts
    Linear,
    /// delay = interval * 2^(failed_attempts - 1)
    Exponential,
}

/// Configuration for a bounded poll.
///
/// Missing fields take their [`Default`] values when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries including the first; `1` means no retry.
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub interval_ms: u64,
    /// Cap on any single delay in milliseconds.
    pub max_interval_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval_ms: 1000,
            max_interval_ms: 60_000,
            backoff_strategy: BackoffStrategy::Constant,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fixed-spacing config.
    #[must_use]
    pub fn fixed(max_attempts: usize, interval: Duration) -> Self {
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        Self {
            max_attempts,
            interval_ms,
            max_interval_ms: interval_ms.max(Self::default().max_interval_ms),
            backoff_strategy: BackoffStrategy::Constant,
        }
    }

    /// Polling for an instance's public address: metadata propagates quickly.
    #[must_use]
    pub fn instance_address() -> Self {
        Self::fixed(10, Duration::from_secs(10))
    }

    /// Polling for cluster membership: gossip and raft take longer to settle.
    #[must_use]
    pub fn cluster_membership() -> Self {
        Self::fixed(20, Duration::from_secs(5))
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base interval.
    #[must_use]
    pub fn with_interval_ms(mut self, interval: u64) -> Self {
        self.interval_ms = interval;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_interval_ms(mut self, interval: u64) -> Self {
        self.max_interval_ms = interval;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Returns the base interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Worst-case time spent sleeping, ignoring probe latency.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        let mut state = RetryState::new();
        let mut total = Duration::ZERO;
        for _ in 1..self.max_attempts {
            state.failed_attempts += 1;
            total += state.calculate_delay(self);
        }
        total
    }

    /// Checks the config is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ClusterStageError::Config(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// State tracking for one poll.
#[derive(Debug, Default, Clone)]
pub struct RetryState {
    /// Number of attempts that have failed so far.
    pub failed_attempts: usize,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates the delay before the next attempt.
    #[must_use]
    pub fn calculate_delay(&self, config: &RetryConfig) -> Duration {
        let base = config.interval_ms;
        let max = config.max_interval_ms.max(base);
        let failed = self.failed_attempts.max(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(failed as u64).min(max),
            BackoffStrategy::Exponential => {
                let exponent = u32::try_from(failed - 1).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exponent)).min(max)
            }
        };

        Duration::from_millis(delay)
    }

    /// Returns true if no attempts remain.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.failed_attempts >= config.max_attempts
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more attempts, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Records a failed attempt and decides what to do next.
#[must_use]
pub fn should_retry(
    state: &mut RetryState,
    config: &RetryConfig,
    error: &ClusterStageError,
) -> RetryDecision {
    state.failed_attempts += 1;

    if !error.is_retryable() {
        return RetryDecision::NotRetryable;
    }
    if state.is_exhausted(config) {
        return RetryDecision::GiveUp;
    }

    RetryDecision::Retry(state.calculate_delay(config))
}

/// Runs probes with bounded retries and reports progress to an event sink.
#[derive(Clone)]
pub struct Poller {
    sink: Arc<dyn EventSink>,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(Arc::new(NoOpEventSink))
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller").finish_non_exhaustive()
    }
}

impl Poller {
    /// Creates a poller that emits to the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Invokes `probe` until it succeeds or the budget runs out.
    ///
    /// The first success is returned immediately. After a retryable failure
    /// the poller sleeps and tries again; a non-retryable failure is
    /// returned as is. Once `max_attempts` probes have failed, the last
    /// error is returned wrapped in [`ClusterStageError::ConvergenceTimeout`].
    pub async fn run<T, F, Fut>(
        &self,
        description: &str,
        config: &RetryConfig,
        mut probe: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        config.validate()?;
        let mut state = RetryState::new();

        loop {
            let attempt = state.failed_attempts + 1;
            info!(description, attempt, max_attempts = config.max_attempts, "Polling");

            let error = match probe().await {
                Ok(value) => {
                    self.sink.try_emit(
                        events::POLL_SUCCEEDED,
                        Some(serde_json::json!({
                            "description": description,
                            "attempt": attempt,
                        })),
                    );
                    return Ok(value);
                }
                Err(e) => e,
            };

            match should_retry(&mut state, config, &error) {
                RetryDecision::Retry(delay) => {
                    info!(
                        description,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Probe failed, retrying"
                    );
                    self.sink.try_emit(
                        events::POLL_RETRY,
                        Some(serde_json::json!({
                            "description": description,
                            "attempt": attempt,
                            "error": error.to_string(),
                            "kind": error.kind(),
                        })),
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::NotRetryable => {
                    warn!(description, attempt, error = %error, "Probe failed with a non-retryable error");
                    self.emit_exhausted(description, attempt, &error);
                    return Err(error);
                }
                RetryDecision::GiveUp => {
                    warn!(description, attempts = attempt, error = %error, "Probe budget exhausted");
                    self.emit_exhausted(description, attempt, &error);
                    return Err(ClusterStageError::ConvergenceTimeout {
                        description: description.to_string(),
                        attempts: attempt,
                        last_error: Box::new(error),
                    });
                }
            }
        }
    }

    fn emit_exhausted(&self, description: &str, attempts: usize, error: &ClusterStageError) {
        self.sink.try_emit(
            events::POLL_EXHAUSTED,
            Some(serde_json::json!({
                "description": description,
                "attempts": attempts,
                "error": error.to_string(),
                "kind": error.kind(),
            })),
        );
    }
}

/// Invokes `probe` with bounded retries and no event reporting.
///
/// See [`Poller::run`].
pub async fn do_with_retry<T, F, Fut>(description: &str, config: &RetryConfig, probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Poller::default().run(description, config, probe).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MemberRole;
    use crate::events::CollectingEventSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick(max_attempts: usize) -> RetryConfig {
        RetryConfig::fixed(max_attempts, Duration::ZERO)
    }

    fn transient() -> ClusterStageError {
        ClusterStageError::transport("http://10.0.0.1:4646/v1/nodes", "connection refused")
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.interval_ms, 1000);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Constant);
    }

    #[test]
    fn test_named_configs() {
        let address = RetryConfig::instance_address();
        assert_eq!(address.max_attempts, 10);
        assert_eq!(address.interval(), Duration::from_secs(10));

        let membership = RetryConfig::cluster_membership();
        assert_eq!(membership.max_attempts, 20);
        assert_eq!(membership.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_worst_case_wait() {
        // (max_attempts - 1) * interval
        assert_eq!(
            RetryConfig::cluster_membership().worst_case_wait(),
            Duration::from_secs(95)
        );
        assert_eq!(quick(1).worst_case_wait(), Duration::ZERO);
    }

    #[test]
    fn test_calculate_delay_strategies() {
        let config = RetryConfig::new()
            .with_interval_ms(100)
            .with_max_interval_ms(250);
        let mut state = RetryState::new();

        state.failed_attempts = 3;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(100));

        let linear = config.clone().with_backoff(BackoffStrategy::Linear);
        state.failed_attempts = 2;
        assert_eq!(state.calculate_delay(&linear), Duration::from_millis(200));
        state.failed_attempts = 5;
        assert_eq!(state.calculate_delay(&linear), Duration::from_millis(250));

        let exponential = config.with_backoff(BackoffStrategy::Exponential);
        state.failed_attempts = 1;
        assert_eq!(state.calculate_delay(&exponential), Duration::from_millis(100));
        state.failed_attempts = 2;
        assert_eq!(state.calculate_delay(&exponential), Duration::from_millis(200));
        state.failed_attempts = 10;
        assert_eq!(state.calculate_delay(&exponential), Duration::from_millis(250));
    }

    #[test]
    fn test_should_retry() {
        let config = quick(3);
        let mut state = RetryState::new();

        assert!(matches!(
            should_retry(&mut state, &config, &transient()),
            RetryDecision::Retry(_)
        ));
        assert!(matches!(
            should_retry(&mut state, &config, &transient()),
            RetryDecision::Retry(_)
        ));
        assert_eq!(
            should_retry(&mut state, &config, &transient()),
            RetryDecision::GiveUp
        );

        let mut state = RetryState::new();
        let fatal = ClusterStageError::not_found("/work", "GcpProjectId");
        assert_eq!(
            should_retry(&mut state, &config, &fatal),
            RetryDecision::NotRetryable
        );
    }

    #[tokio::test]
    async fn test_always_failing_probe_runs_exactly_max_attempts() {
        for m in 1..=5 {
            let calls = AtomicUsize::new(0);
            let result: Result<()> = do_with_retry("always fails", &quick(m), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

            assert_eq!(calls.load(Ordering::SeqCst), m);
            match result.unwrap_err() {
                ClusterStageError::ConvergenceTimeout {
                    description,
                    attempts,
                    last_error,
                } => {
                    assert_eq!(description, "always fails");
                    assert_eq!(attempts, m);
                    assert_eq!(last_error.kind(), "transport");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn test_probe_succeeding_on_attempt_i_runs_i_times() {
        for i in 1..=4 {
            let calls = AtomicUsize::new(0);
            let result = do_with_retry("eventually", &quick(4), || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < i {
                        Err(ClusterStageError::count_mismatch(MemberRole::Server, 3, n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

            assert_eq!(result.unwrap(), i);
            assert_eq!(calls.load(Ordering::SeqCst), i);
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = do_with_retry("fatal", &quick(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ClusterStageError::not_found("/work", "GcpRegionName")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), "not_found");
    }

    #[tokio::test]
    async fn test_zero_attempts_is_config_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = do_with_retry("never", &quick(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.unwrap_err().kind(), "config");
    }

    #[tokio::test]
    async fn test_poller_emits_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let poller = Poller::new(sink.clone());
        let calls = AtomicUsize::new(0);

        let value = poller
            .run("two tries", &quick(3), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 0 { Err(transient()) } else { Ok("up") } }
            })
            .await
            .unwrap();

        assert_eq!(value, "up");
        assert_eq!(sink.events_of_type(events::POLL_RETRY).len(), 1);
        assert_eq!(sink.events_of_type(events::POLL_SUCCEEDED).len(), 1);
        assert!(sink.events_of_type(events::POLL_EXHAUSTED).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts_only() {
        let start = tokio::time::Instant::now();
        let _: Result<()> = do_with_retry(
            "spaced",
            &RetryConfig::fixed(3, Duration::from_secs(5)),
            || async { Err(transient()) },
        )
        .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(15));
    }
}
