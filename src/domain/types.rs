//! Shared domain enumerations reported by the host content system.

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Publication status of a content item as reported by the host.
///
/// Parsing is total: any status the host invents later lands in
/// [`ContentStatus::Other`] and is treated as not published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    Trash,
    AutoDraft,
    Inherit,
    Other(String),
}

impl ContentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ContentStatus::Publish => "publish",
            ContentStatus::Future => "future",
            ContentStatus::Draft => "draft",
            ContentStatus::Pending => "pending",
            ContentStatus::Private => "private",
            ContentStatus::Trash => "trash",
            ContentStatus::AutoDraft => "auto-draft",
            ContentStatus::Inherit => "inherit",
            ContentStatus::Other(raw) => raw.as_str(),
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, ContentStatus::Publish)
    }
}

impl FromStr for ContentStatus {
    type Err = Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let status = match value.trim() {
            "publish" => ContentStatus::Publish,
            "future" => ContentStatus::Future,
            "draft" => ContentStatus::Draft,
            "pending" => ContentStatus::Pending,
            "private" => ContentStatus::Private,
            "trash" => ContentStatus::Trash,
            "auto-draft" => ContentStatus::AutoDraft,
            "inherit" => ContentStatus::Inherit,
            other => ContentStatus::Other(other.to_string()),
        };
        Ok(status)
    }
}

impl From<&str> for ContentStatus {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<String> for ContentStatus {
    fn from(value: String) -> Self {
        ContentStatus::from(value.as_str())
    }
}

impl From<ContentStatus> for String {
    fn from(status: ContentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which host notification produced a transition event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The item's status changed.
    StatusChange,
    /// The item was saved, whether or not its status changed.
    Save,
    /// A scheduled item reached its publication time.
    ScheduledPublish,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::StatusChange => "status_change",
            TransitionKind::Save => "save",
            TransitionKind::ScheduledPublish => "scheduled_publish",
        }
    }
}
