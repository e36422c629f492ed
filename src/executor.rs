// ABOUTME: Resilient executor wrapping outbound provider calls with retry and backoff
// ABOUTME: Retries transient failures under a bounded attempt budget with capped exponential delays
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Resilient Call Executor
//!
//! Every outbound provider call goes through [`CallExecutor::execute`]. On
//! each failure the call site's classifier decides whether the error is a
//! transient signal (rate limiting, 5xx, connection reset, timeout) worth
//! retrying or a fatal one surfaced immediately. Backoff is exponential with
//! a configurable multiplier, capped at `max_delay`, with jitter to avoid
//! thundering herds. A retry observation is logged before each delay so
//! external telemetry can count attempts per operation.

use crate::constants::retries;
use crate::providers::errors::ProviderError;
use crate::providers::ProviderResult;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Classification of a provider failure at a specific call site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying within the attempt budget
    Transient,
    /// Surfaced immediately; retrying cannot help
    Fatal,
}

/// Retry behavior for one category of provider operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first (must be at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap applied to every computed delay
    pub max_delay: Duration,
    /// Exponential growth factor between attempts
    pub multiplier: f64,
    /// Add 0-99ms of jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retries::DEFAULT_MAX_ATTEMPTS,
            base_delay: retries::DEFAULT_BASE_DELAY,
            max_delay: retries::DEFAULT_MAX_DELAY,
            multiplier: retries::DEFAULT_MULTIPLIER,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; useful for strictly-once operations
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Compute the backoff delay before retry number `attempt` (1-based)
    ///
    /// `delay = min(base * multiplier^(attempt-1), max) + jitter`
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let scaled = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        // f64 -> u64 is safe here: capped is bounded by max_delay's millis
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut millis = capped.max(0.0) as u64;
        if self.jitter {
            millis += rand::thread_rng().gen_range(0..100);
        }
        Duration::from_millis(millis)
    }
}

/// Executes provider operations under a retry policy
#[derive(Debug, Clone, Default)]
pub struct CallExecutor {
    policy: RetryPolicy,
}

impl CallExecutor {
    /// Create an executor with the given policy
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy this executor applies
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `run` with the default classifier ([`ProviderError::is_retryable`])
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, or
    /// [`ProviderError::RetryBudgetExhausted`] wrapping the last transient
    /// error once the attempt budget is spent.
    pub async fn execute<T, F, Fut>(&self, operation: &str, run: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        self.execute_classified(
            operation,
            |error| {
                if error.is_retryable() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Fatal
                }
            },
            run,
        )
        .await
    }

    /// Execute `run` with a call-site-specific error classifier
    ///
    /// # Errors
    ///
    /// Returns the first error classified fatal, or
    /// [`ProviderError::RetryBudgetExhausted`] wrapping the last transient
    /// error once the attempt budget is spent.
    pub async fn execute_classified<T, F, Fut, C>(
        &self,
        operation: &str,
        classify: C,
        mut run: F,
    ) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
        C: Fn(&ProviderError) -> ErrorClass,
    {
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match run().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if classify(&error) == ErrorClass::Fatal {
                        return Err(error);
                    }
                    if attempt >= max_attempts {
                        return Err(ProviderError::RetryBudgetExhausted {
                            operation: operation.to_owned(),
                            attempts: attempt,
                            source: Box::new(error),
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    // Retry observation for external telemetry consumption
                    warn!(
                        operation = %operation,
                        attempt,
                        max_attempts,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider failure, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn transient() -> ProviderError {
        ProviderError::Timeout {
            provider: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion() {
        let executor = CallExecutor::new(fast_policy(3));
        let attempts = AtomicU32::new(0);

        let result: ProviderResult<()> = executor
            .execute("test.op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            ProviderError::RetryBudgetExhausted {
                operation,
                attempts,
                source,
            } => {
                assert_eq!(operation, "test.op");
                assert_eq!(attempts, 3);
                assert!(source.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_short_circuits() {
        let executor = CallExecutor::new(fast_policy(3));
        let attempts = AtomicU32::new(0);

        let result: ProviderResult<()> = executor
            .execute("test.op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::InvalidRequest {
                        provider: "test".into(),
                        message: "invalid number".into(),
                    })
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err(),
            ProviderError::InvalidRequest { .. }
        ));
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let executor = CallExecutor::new(fast_policy(3));
        let attempts = AtomicU32::new(0);

        let result = executor
            .execute("test.op", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        // Capped at max_delay from the third retry onward
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(350));
    }
}
