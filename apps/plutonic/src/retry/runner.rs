//! Retry loop with per-call timeout and cooperative cancellation.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::{ExponentialBackoff, RetryPolicy};
use crate::application::ports::BrokerError;

/// Why a retried call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    /// The broker returned a non-retryable error. Exactly one attempt was made.
    #[error("{0}")]
    NonRetryable(BrokerError),

    /// Every attempt failed with a transient error.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: BrokerError,
    },

    /// Shutdown was signalled before the operation could succeed.
    #[error("Retry cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts made before cancellation was observed.
        attempts: u32,
        /// Error from the most recent attempt, if any ran.
        last: Option<BrokerError>,
    },
}

impl RetryError {
    /// The last broker error observed, if any.
    #[must_use]
    pub const fn last_error(&self) -> Option<&BrokerError> {
        match self {
            Self::NonRetryable(err) | Self::Exhausted { last: err, .. } => Some(err),
            Self::Cancelled { last, .. } => last.as_ref(),
        }
    }

    /// Number of attempts made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::NonRetryable(_) => 1,
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Runs broker calls under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryRunner {
    policy: RetryPolicy,
}

impl RetryRunner {
    /// Create a runner.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails permanently, runs out of attempts
    /// or `cancel` fires.
    ///
    /// An attempt already in flight when `cancel` fires runs to completion or
    /// timeout; no further attempt is started.
    ///
    /// # Errors
    ///
    /// See [`RetryError`].
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrokerError>>,
    {
        let mut backoff = ExponentialBackoff::new(&self.policy);
        let mut attempts = 0u32;
        let mut last = None;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(operation, attempts, "Retry loop cancelled before attempt");
                return Err(RetryError::Cancelled { attempts, last });
            }

            attempts += 1;
            let outcome = match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(BrokerError::timeout(self.policy.call_timeout)),
            };

            let err = match outcome {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(operation, attempts, "Broker call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(RetryError::NonRetryable(err));
            }

            let Some(delay) = backoff.next_backoff_with_hint(err.retry_after()) else {
                tracing::warn!(operation, attempts, error = %err, "Broker call retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts,
                    last: err,
                });
            };

            tracing::warn!(
                operation,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient broker failure, retrying"
            );
            last = Some(err);

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(operation, attempts, "Retry backoff interrupted by shutdown");
                    return Err(RetryError::Cancelled { attempts, last });
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
