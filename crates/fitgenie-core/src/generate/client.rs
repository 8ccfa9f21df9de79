//! Bounded-retry invocation of a [`TextGenerator`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use super::trait_def::TextGenerator;

/// Timing knobs for [`GenerativeClient`]. The attempt ceiling is passed per
/// call, not stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
    /// Cap on the un-jittered delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(30),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Retry immediately with the given per-attempt timeout.
    pub fn without_backoff(attempt_timeout: Duration) -> Self {
        Self {
            attempt_timeout,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after failed attempt number `failed_attempt` (1-based).
    ///
    /// Exponential in the attempt number, capped at `max_delay`, then scaled
    /// by a random factor in `[0.5, 1.0]`.
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        let factor: f64 = rand::rng().random_range(0.5..=1.0);
        ceiling.mul_f64(factor)
    }
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModelResponse {
    pub text: String,
    /// The exact prompt that produced `text`.
    pub prompt: String,
    /// Number of attempts made, including the successful one.
    pub attempts: u32,
}

/// Every attempt failed.
#[derive(Debug, Clone, Error)]
#[error("generation failed after {attempts} attempt(s): {last_error}")]
pub struct GenerationError {
    pub attempts: u32,
    pub last_error: String,
}

/// Calls a [`TextGenerator`] until it succeeds or the attempt budget runs out.
#[derive(Clone)]
pub struct GenerativeClient {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl GenerativeClient {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    /// Name of the underlying generator.
    pub fn source(&self) -> &str {
        self.generator.name()
    }

    /// Generate a completion for `prompt`, making at most `max_attempts`
    /// calls (zero is treated as one).
    pub async fn generate(
        &self,
        prompt: &str,
        max_attempts: u32,
    ) -> Result<RawModelResponse, GenerationError> {
        let max_attempts = max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome =
                tokio::time::timeout(self.policy.attempt_timeout, self.generator.generate(prompt))
                    .await;

            let err = match outcome {
                Ok(Ok(text)) => {
                    tracing::debug!(
                        generator = self.generator.name(),
                        attempt,
                        "model call succeeded"
                    );
                    return Ok(RawModelResponse {
                        text,
                        prompt: prompt.to_owned(),
                        attempts: attempt,
                    });
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(_) => format!(
                    "attempt timed out after {}ms",
                    self.policy.attempt_timeout.as_millis()
                ),
            };

            tracing::warn!(
                generator = self.generator.name(),
                attempt,
                max_attempts,
                error = %err,
                "model call failed"
            );
            last_error = err;

            if attempt < max_attempts {
                let delay = self.policy.backoff(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(GenerationError {
            attempts: max_attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::{Result, bail};
    use async_trait::async_trait;

    use super::*;

    /// Fails the first `failures` calls, then returns "ok".
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                bail!("upstream unavailable (call {n})");
            }
            Ok("ok".to_owned())
        }
    }

    struct Slow;

    #[async_trait]
    impl TextGenerator for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late".to_owned())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::without_backoff(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let generator = Flaky::new(2);
        let client = GenerativeClient::new(generator.clone(), fast_policy());

        let response = client.generate("prompt", 3).await.unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(response.prompt, "prompt");
        assert_eq!(response.attempts, 3);
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let generator = Flaky::new(u32::MAX);
        let client = GenerativeClient::new(generator.clone(), fast_policy());

        let err = client.generate("prompt", 2).await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.last_error.contains("call 2"), "{}", err.last_error);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn success_short_circuits() {
        let generator = Flaky::new(0);
        let client = GenerativeClient::new(generator.clone(), fast_policy());

        let response = client.generate("prompt", 5).await.unwrap();
        assert_eq!(response.attempts, 1);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn zero_attempts_means_one() {
        let generator = Flaky::new(u32::MAX);
        let client = GenerativeClient::new(generator.clone(), fast_policy());

        let err = client.generate("prompt", 0).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_failure() {
        let client = GenerativeClient::new(
            Arc::new(Slow),
            RetryPolicy::without_backoff(Duration::from_millis(20)),
        );

        let err = client.generate("prompt", 2).await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.last_error.contains("timed out"));
    }

    #[tokio::test]
    async fn backoff_between_attempts() {
        let generator = Flaky::new(1);
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(40),
            max_delay: Duration::from_millis(40),
        };
        let client = GenerativeClient::new(generator.clone(), policy);

        let started = std::time::Instant::now();
        client.generate("prompt", 2).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn backoff_is_capped_and_jittered() {
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_secs(1),
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };
        for _ in 0..50 {
            let first = policy.backoff(1);
            assert!(first >= Duration::from_millis(50) && first <= Duration::from_millis(100));
            let late = policy.backoff(10);
            assert!(late >= Duration::from_millis(150) && late <= Duration::from_millis(300));
        }
    }

    #[test]
    fn zero_base_delay_never_sleeps() {
        let policy = RetryPolicy::without_backoff(Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(7), Duration::ZERO);
    }
}
