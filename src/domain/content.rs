//! Content transition events delivered by the host.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::types::{ContentStatus, TransitionKind};

/// Opaque identifier of a content item in the host system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for ContentId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for ContentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single status/save notification about one content item.
///
/// Created by the host adapter and consumed once by the event filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTransitionEvent {
    pub kind: TransitionKind,
    pub content_id: ContentId,
    pub previous_status: ContentStatus,
    pub new_status: ContentStatus,
    #[serde(default)]
    pub is_revision: bool,
    #[serde(default)]
    pub is_autosave: bool,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub occurred_at: OffsetDateTime,
}

impl ContentTransitionEvent {
    pub fn new(
        kind: TransitionKind,
        content_id: impl Into<ContentId>,
        previous_status: impl Into<ContentStatus>,
        new_status: impl Into<ContentStatus>,
    ) -> Self {
        Self {
            kind,
            content_id: content_id.into(),
            previous_status: previous_status.into(),
            new_status: new_status.into(),
            is_revision: false,
            is_autosave: false,
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn status_change(
        content_id: impl Into<ContentId>,
        previous_status: impl Into<ContentStatus>,
        new_status: impl Into<ContentStatus>,
    ) -> Self {
        Self::new(
            TransitionKind::StatusChange,
            content_id,
            previous_status,
            new_status,
        )
    }

    pub fn save(
        content_id: impl Into<ContentId>,
        previous_status: impl Into<ContentStatus>,
        new_status: impl Into<ContentStatus>,
    ) -> Self {
        Self::new(TransitionKind::Save, content_id, previous_status, new_status)
    }

    /// A scheduled item going live: always `future -> publish`.
    pub fn scheduled_publish(content_id: impl Into<ContentId>) -> Self {
        Self::new(
            TransitionKind::ScheduledPublish,
            content_id,
            ContentStatus::Future,
            ContentStatus::Publish,
        )
    }

    pub fn revision(mut self) -> Self {
        self.is_revision = true;
        self
    }

    pub fn autosave(mut self) -> Self {
        self.is_autosave = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_host_payload_with_defaults() {
        let event: ContentTransitionEvent = serde_json::from_str(
            r#"{"kind":"save","content_id":"42","previous_status":"draft","new_status":"publish"}"#,
        )
        .expect("valid payload");

        assert_eq!(event.kind, TransitionKind::Save);
        assert_eq!(event.content_id, ContentId::from(42u64));
        assert_eq!(event.previous_status, ContentStatus::Draft);
        assert_eq!(event.new_status, ContentStatus::Publish);
        assert!(!event.is_revision);
        assert!(!event.is_autosave);
    }

    #[test]
    fn statuses_serialize_as_host_strings() {
        let event = ContentTransitionEvent::scheduled_publish(7u64).autosave();
        let json = serde_json::to_value(&event).expect("serializable");

        assert_eq!(json["previous_status"], "future");
        assert_eq!(json["new_status"], "publish");
        assert_eq!(json["kind"], "scheduled_publish");
        assert_eq!(json["is_autosave"], true);
    }
}
