//! Purge backend capability and the slot that resolves it at purge time.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::info;

use super::error::PurgeError;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "purge::backend";

/// A system able to invalidate an entire cache on command.
///
/// Implementations must tolerate repeated calls with no content change in
/// between; a full purge is idempotent.
#[async_trait]
pub trait PurgeBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn purge_everything(&self) -> Result<(), PurgeError>;
}

/// Holds the currently installed backend, if any.
///
/// The CDN client is owned by another component which may come and go at
/// runtime; resolving an empty slot yields [`PurgeError::BackendUnavailable`].
#[derive(Default)]
pub struct BackendSlot {
    backend: RwLock<Option<Arc<dyn PurgeBackend>>>,
}

impl BackendSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_backend(backend: Arc<dyn PurgeBackend>) -> Self {
        Self {
            backend: RwLock::new(Some(backend)),
        }
    }

    /// Install (or replace) the backend.
    pub fn install(&self, backend: Arc<dyn PurgeBackend>) {
        info!(backend = backend.name(), "Purge backend installed");
        *rw_write(&self.backend, SOURCE, "install") = Some(backend);
    }

    /// Remove the backend; later purges are skipped until one is installed.
    pub fn remove(&self) -> Option<Arc<dyn PurgeBackend>> {
        let removed = rw_write(&self.backend, SOURCE, "remove").take();
        if let Some(backend) = &removed {
            info!(backend = backend.name(), "Purge backend removed");
        }
        removed
    }

    pub fn resolve(&self) -> Result<Arc<dyn PurgeBackend>, PurgeError> {
        rw_read(&self.backend, SOURCE, "resolve")
            .clone()
            .ok_or_else(|| PurgeError::unavailable("no purge backend installed"))
    }

    pub fn is_available(&self) -> bool {
        rw_read(&self.backend, SOURCE, "is_available").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl PurgeBackend for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn purge_everything(&self) -> Result<(), PurgeError> {
            Ok(())
        }
    }

    #[test]
    fn empty_slot_reports_unavailable() {
        let slot = BackendSlot::empty();
        let err = slot.resolve().err().expect("empty slot must not resolve");
        assert_eq!(err.kind(), "backend_unavailable");
        assert!(!err.is_retryable());
    }

    #[test]
    fn install_and_remove_round_trip() {
        let slot = BackendSlot::empty();
        slot.install(Arc::new(Noop));
        assert!(slot.is_available());
        assert_eq!(slot.resolve().expect("installed").name(), "noop");

        assert!(slot.remove().is_some());
        assert!(!slot.is_available());
        assert!(slot.remove().is_none());
    }
}
