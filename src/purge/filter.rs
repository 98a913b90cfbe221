//! Decides which content transitions warrant a full purge.

use std::fmt;

use crate::domain::content::ContentTransitionEvent;
use crate::domain::types::TransitionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    /// Item moved into `publish` from another status.
    Published,
    /// Already published item was saved again.
    Updated,
    /// A scheduled item went live.
    ScheduledPublish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Revision,
    Autosave,
    NotPublished,
    /// `publish -> publish` status notification; the save notification covers it.
    AlreadyPublished,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Revision => "revision",
            RejectReason::Autosave => "autosave",
            RejectReason::NotPublished => "not_published",
            RejectReason::AlreadyPublished => "already_published",
        }
    }
}

/// Result of running an event through the filter. A rejection is an
/// expected no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept(AcceptReason),
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_accept(self) -> bool {
        matches!(self, FilterDecision::Accept(_))
    }
}

impl fmt::Display for FilterDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterDecision::Accept(reason) => write!(f, "accept({reason:?})"),
            FilterDecision::Reject(reason) => write!(f, "reject({})", reason.as_str()),
        }
    }
}

/// Stateless publish/update filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter;

impl EventFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, event: &ContentTransitionEvent) -> bool {
        self.evaluate(event).is_accept()
    }

    /// First matching rule wins.
    pub fn evaluate(&self, event: &ContentTransitionEvent) -> FilterDecision {
        if event.is_revision {
            return FilterDecision::Reject(RejectReason::Revision);
        }
        if event.is_autosave {
            return FilterDecision::Reject(RejectReason::Autosave);
        }
        if !event.new_status.is_published() {
            return FilterDecision::Reject(RejectReason::NotPublished);
        }
        if event.kind == TransitionKind::ScheduledPublish {
            return FilterDecision::Accept(AcceptReason::ScheduledPublish);
        }
        if event.previous_status.is_published() {
            return match event.kind {
                TransitionKind::Save => FilterDecision::Accept(AcceptReason::Updated),
                _ => FilterDecision::Reject(RejectReason::AlreadyPublished),
            };
        }
        FilterDecision::Accept(AcceptReason::Published)
    }
}
