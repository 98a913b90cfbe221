use tracing::{info, warn};

use super::attempt::PurgeAttempt;

/// Receives every finished attempt, successful or not.
pub trait PurgeObserver: Send + Sync {
    fn on_attempt(&self, attempt: &PurgeAttempt);
}

/// Default observer: one structured log line per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PurgeObserver for TracingObserver {
    fn on_attempt(&self, attempt: &PurgeAttempt) {
        match attempt.outcome.error() {
            None => info!(
                attempt_id = %attempt.id,
                reason = %attempt.reason,
                retry_count = attempt.retry_count,
                elapsed_ms = attempt.elapsed_ms(),
                "Purged entire cache"
            ),
            Some(err) => warn!(
                attempt_id = %attempt.id,
                reason = %attempt.reason,
                retry_count = attempt.retry_count,
                elapsed_ms = attempt.elapsed_ms(),
                error_kind = err.kind(),
                error = %err,
                "Cache purge failed"
            ),
        }
    }
}
