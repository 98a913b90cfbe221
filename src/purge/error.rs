use std::time::Duration;

use thiserror::Error;

/// Why a purge did not succeed.
///
/// Carried as data inside [`PurgeOutcome::Failure`](super::PurgeOutcome);
/// never returned from the scheduler's public operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurgeError {
    #[error("purge backend unavailable: {reason}")]
    BackendUnavailable { reason: String },
    #[error("purge backend failed: {reason}")]
    BackendFailure { reason: String },
    #[error("purge backend did not answer within {after:?}")]
    Timeout { after: Duration },
}

impl PurgeError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::BackendFailure {
            reason: reason.into(),
        }
    }

    /// Unavailability is a configuration problem; retrying cannot fix it.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::BackendUnavailable { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendFailure { .. } => "backend_failure",
            Self::Timeout { .. } => "timeout",
        }
    }
}
