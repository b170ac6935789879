//! ---
//! uflow_section: "05-resilience-fault-tolerance"
//! uflow_subsection: "module"
//! uflow_type: "source"
//! uflow_scope: "code"
//! uflow_description: "Retry strategies with deterministic backoff."
//! uflow_version: "v0.1.0"
//! uflow_owner: "tbd"
//! ---
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::{debug, warn};

use uflow_common::config::RetryConfig;

const DEFAULT_RETRY_SEED: u64 = 0xBAC_0FF;

/// Policy parameters controlling retry attempts and scheduling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: usize,
    /// Base delay applied before the second attempt (exponential backoff).
    pub base_delay: Duration,
    /// Maximum jitter added to each delay to avoid thundering herds.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Construct a policy; `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: usize, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }

    /// Build a policy from the retry section of the application config.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay, config.jitter)
    }

    /// Calculate the delay for the provided attempt (1-indexed) with exponential growth.
    fn backoff_delay(&self, attempt: usize, rng: &mut StdRng) -> Duration {
        let exponent = (attempt.saturating_sub(1) as u32).min(8);
        let base = self.base_delay.mul_f64(2u32.pow(exponent) as f64);
        if self.jitter.is_zero() {
            base
        } else {
            let jitter_ms = rng.gen_range(0..=self.jitter.as_millis().max(1)) as u64;
            base + Duration::from_millis(jitter_ms)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250), Duration::from_millis(50))
    }
}

/// Terminal outcome of a retried operation that never succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure<E> {
    /// Attempts spent, the final one included.
    pub attempts: usize,
    /// Error returned by the final attempt.
    pub error: E,
}

/// Drives a fallible asynchronous operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Retrier {
    policy: RetryPolicy,
    rng: StdRng,
}

impl Retrier {
    /// Create a retrier with the default deterministic seed.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(DEFAULT_RETRY_SEED),
        }
    }

    /// Seed the internal jitter generator, e.g. per stage, for deterministic replay.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run `operation` until it succeeds, a terminal error occurs, or the
    /// attempt budget is exhausted. The closure receives the 1-indexed
    /// attempt number; `is_retryable` classifies errors worth another try.
    pub async fn run<T, E, F, Fut, P>(
        &mut self,
        label: &str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "operation recovered after retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt >= self.policy.max_attempts || !is_retryable(&error) {
                        warn!(label, attempt, error = %error, "giving up on operation");
                        return Err(RetryFailure {
                            attempts: attempt,
                            error,
                        });
                    }
                    let delay = self.policy.backoff_delay(attempt, &mut self.rng);
                    warn!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "operation failed; backing off before retry",
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let mut retrier = Retrier::new(fast_policy(3)).with_seed(1234);
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let value = retrier
            .run(
                "lookup",
                move |attempt| {
                    let seen = seen.clone();
                    async move {
                        seen.store(attempt, Ordering::SeqCst);
                        if attempt < 2 {
                            Err("transient")
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| true,
            )
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_the_attempt_budget() {
        let mut retrier = Retrier::new(fast_policy(3)).with_seed(42);
        let failure = retrier
            .run("lookup", |_| async { Err::<(), _>("still broken") }, |_| true)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error, "still broken");
    }

    #[tokio::test]
    async fn terminal_errors_short_circuit() {
        let mut retrier = Retrier::new(fast_policy(5));
        let failure = retrier
            .run("lookup", |_| async { Err::<(), _>("rejected") }, |_| false)
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
    }

    #[tokio::test]
    async fn single_attempt_policy_never_retries() {
        let mut retrier = Retrier::new(fast_policy(1));
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let failure = retrier
            .run(
                "lookup",
                move |attempt| {
                    let seen = seen.clone();
                    async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        let _ = attempt;
                        Err::<(), _>("broken")
                    }
                },
                |_| true,
            )
            .await
            .unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
