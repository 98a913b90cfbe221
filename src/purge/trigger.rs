//! Purge trigger service.
//!
//! Connects content events to the scheduler: every event passes through the
//! filter, and accepted ones become purge requests.

use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use crate::domain::content::{ContentId, ContentTransitionEvent};
use crate::domain::types::ContentStatus;

use super::attempt::PurgeRequest;
use super::events::ContentEventHandler;
use super::filter::{EventFilter, FilterDecision};
use super::scheduler::CoalescingScheduler;

const METRIC_EVENTS_REJECTED: &str = "purge_relay_events_rejected_total";

/// Filters content events and forwards accepted ones to the scheduler.
///
/// # Usage
///
/// ```ignore
/// // From the host's "post saved" hook:
/// trigger.saved(post_id, old_status, new_status);
/// ```
pub struct PurgeTrigger {
    filter: EventFilter,
    scheduler: Arc<CoalescingScheduler>,
}

impl PurgeTrigger {
    pub fn new(scheduler: Arc<CoalescingScheduler>) -> Self {
        Self {
            filter: EventFilter::new(),
            scheduler,
        }
    }

    /// Run the filter and enqueue a purge when it accepts.
    pub fn trigger(&self, event: &ContentTransitionEvent) -> FilterDecision {
        let decision = self.filter.evaluate(event);
        match decision {
            FilterDecision::Accept(_) => {
                self.scheduler
                    .request_purge(PurgeRequest::for_content(event.content_id.clone()));
            }
            FilterDecision::Reject(reason) => {
                debug!(
                    content_id = %event.content_id,
                    kind = event.kind.as_str(),
                    previous_status = %event.previous_status,
                    new_status = %event.new_status,
                    reason = reason.as_str(),
                    "Content event does not require a purge"
                );
                counter!(METRIC_EVENTS_REJECTED, "reason" => reason.as_str()).increment(1);
            }
        }
        decision
    }

    /// Host hook: status transition.
    pub fn status_changed(
        &self,
        content_id: impl Into<ContentId>,
        previous_status: impl Into<ContentStatus>,
        new_status: impl Into<ContentStatus>,
    ) -> FilterDecision {
        self.trigger(&ContentTransitionEvent::status_change(
            content_id,
            previous_status,
            new_status,
        ))
    }

    /// Host hook: item saved.
    pub fn saved(
        &self,
        content_id: impl Into<ContentId>,
        previous_status: impl Into<ContentStatus>,
        new_status: impl Into<ContentStatus>,
    ) -> FilterDecision {
        self.trigger(&ContentTransitionEvent::save(
            content_id,
            previous_status,
            new_status,
        ))
    }

    /// Host hook: scheduled item published.
    pub fn scheduled_publish(&self, content_id: impl Into<ContentId>) -> FilterDecision {
        self.trigger(&ContentTransitionEvent::scheduled_publish(content_id))
    }

    pub fn scheduler(&self) -> &Arc<CoalescingScheduler> {
        &self.scheduler
    }
}

impl ContentEventHandler for PurgeTrigger {
    fn handle(&self, event: &ContentTransitionEvent) {
        self.trigger(event);
    }
}
