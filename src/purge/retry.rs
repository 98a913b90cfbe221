//! Bounded retry with exponential backoff around a single purge.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use metrics::counter;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use super::attempt::{PurgeAttempt, PurgeOutcome, PurgeReason};
use super::backend::PurgeBackend;
use super::config::PurgeConfig;
use super::error::PurgeError;

const METRIC_PURGE_RETRIES: &str = "purge_relay_retries_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PurgeConfig::default())
    }
}

impl From<&PurgeConfig> for RetryPolicy {
    fn from(config: &PurgeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base(),
            call_timeout: config.purge_timeout(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }

    /// Run one purge, retrying transient failures.
    ///
    /// Never fails: the last error ends up in the attempt's outcome.
    pub async fn execute(&self, backend: &dyn PurgeBackend, reason: PurgeReason) -> PurgeAttempt {
        let started_at = Instant::now();
        let mut retry_count = 0;

        loop {
            let error = match self.call(backend).await {
                Ok(()) => {
                    return PurgeAttempt::finish(
                        reason,
                        started_at,
                        PurgeOutcome::Success,
                        retry_count,
                    );
                }
                Err(err) => err,
            };

            if !error.is_retryable() || retry_count >= self.max_retries {
                if error.is_retryable() {
                    warn!(
                        backend = backend.name(),
                        retry_count,
                        error = %error,
                        "Purge retries exhausted"
                    );
                }
                return PurgeAttempt::finish(
                    reason,
                    started_at,
                    PurgeOutcome::Failure(error),
                    retry_count,
                );
            }

            retry_count += 1;
            let delay = self.backoff(retry_count);
            debug!(
                backend = backend.name(),
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Purge failed; backing off"
            );
            counter!(METRIC_PURGE_RETRIES).increment(1);
            sleep(delay).await;
        }
    }

    async fn call(&self, backend: &dyn PurgeBackend) -> Result<(), PurgeError> {
        let guarded = AssertUnwindSafe(backend.purge_everything()).catch_unwind();
        match timeout(self.call_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(PurgeError::failure(format!(
                "backend `{}` panicked during purge",
                backend.name()
            ))),
            Err(_) => Err(PurgeError::Timeout {
                after: self.call_timeout,
            }),
        }
    }
}
