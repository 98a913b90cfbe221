//! Bounded in-memory record of purge attempts.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use super::attempt::PurgeAttempt;
use super::lock::mutex_lock;

const SOURCE: &str = "purge::audit";

/// Append-only log of finished attempts. Oldest entries are evicted once
/// the capacity is reached.
pub struct AuditLog {
    entries: Mutex<VecDeque<PurgeAttempt>>,
    capacity: NonZeroUsize,
}

impl AuditLog {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.get())),
            capacity,
        }
    }

    pub fn record(&self, attempt: PurgeAttempt) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "record");
        while entries.len() >= self.capacity.get() {
            entries.pop_front();
        }
        entries.push_back(attempt);
    }

    /// Up to `n` attempts, most recent first.
    pub fn recent(&self, n: usize) -> Vec<PurgeAttempt> {
        mutex_lock(&self.entries, SOURCE, "recent")
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(super::PurgeConfig::default().audit_log_capacity_non_zero())
    }
}
