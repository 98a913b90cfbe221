//! Purge requests and the attempts they resolve into.

use std::fmt;

use time::OffsetDateTime;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::content::ContentId;

use super::error::PurgeError;

/// What caused a purge to be owed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeReason {
    /// A single content item changed.
    Content(ContentId),
    /// Several requests were coalesced; only the count is kept.
    Batch { requests: usize },
}

impl PurgeReason {
    pub fn request_count(&self) -> usize {
        match self {
            PurgeReason::Content(_) => 1,
            PurgeReason::Batch { requests } => *requests,
        }
    }
}

impl fmt::Display for PurgeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurgeReason::Content(id) => write!(f, "content:{id}"),
            PurgeReason::Batch { requests } => write!(f, "batch:{requests}"),
        }
    }
}

/// A request that a full purge happen soon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    pub requested_at: Instant,
    pub reason: PurgeReason,
}

impl PurgeRequest {
    pub fn new(reason: PurgeReason) -> Self {
        Self {
            requested_at: Instant::now(),
            reason,
        }
    }

    pub fn for_content(content_id: impl Into<ContentId>) -> Self {
        Self::new(PurgeReason::Content(content_id.into()))
    }

    /// Coalesce two requests into one.
    ///
    /// Keeps the earliest request time; the reason becomes a batch marker
    /// counting every request absorbed so far.
    pub fn merge(self, other: PurgeRequest) -> PurgeRequest {
        PurgeRequest {
            requested_at: self.requested_at.min(other.requested_at),
            reason: PurgeReason::Batch {
                requests: self.reason.request_count() + other.reason.request_count(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
    Success,
    Failure(PurgeError),
}

impl PurgeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PurgeOutcome::Success)
    }

    pub fn error(&self) -> Option<&PurgeError> {
        match self {
            PurgeOutcome::Success => None,
            PurgeOutcome::Failure(err) => Some(err),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PurgeOutcome::Success => "success",
            PurgeOutcome::Failure(_) => "failure",
        }
    }
}

/// One resolved purge, including every retry it took.
#[derive(Debug, Clone)]
pub struct PurgeAttempt {
    pub id: Uuid,
    pub reason: PurgeReason,
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Wall-clock completion time for external reporting.
    pub recorded_at: OffsetDateTime,
    pub outcome: PurgeOutcome,
    pub retry_count: u32,
}

impl PurgeAttempt {
    pub(crate) fn finish(
        reason: PurgeReason,
        started_at: Instant,
        outcome: PurgeOutcome,
        retry_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason,
            started_at,
            finished_at: Instant::now(),
            recorded_at: OffsetDateTime::now_utc(),
            outcome,
            retry_count,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.finished_at
            .saturating_duration_since(self.started_at)
            .as_secs_f64()
            * 1000.0
    }
}
