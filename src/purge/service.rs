//! Wiring for a complete purge pipeline.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::audit::AuditLog;
use super::backend::BackendSlot;
use super::config::PurgeConfig;
use super::events::{ContentEvents, DEFAULT_PRIORITY, SubscriptionId};
use super::observer::{PurgeObserver, TracingObserver};
use super::scheduler::CoalescingScheduler;
use super::trigger::PurgeTrigger;

/// A scheduler, its trigger and the event registry the trigger listens on.
///
/// The host adapter dispatches into [`events`](Self::events); the driver
/// returned by [`start`](Self::start) performs the purges.
pub struct PurgeService {
    events: Arc<ContentEvents>,
    trigger: Arc<PurgeTrigger>,
    scheduler: Arc<CoalescingScheduler>,
    subscription: SubscriptionId,
}

impl PurgeService {
    pub fn new(config: PurgeConfig, backend: Arc<BackendSlot>) -> Self {
        Self::with_observer(config, backend, Arc::new(TracingObserver))
    }

    pub fn with_observer(
        config: PurgeConfig,
        backend: Arc<BackendSlot>,
        observer: Arc<dyn PurgeObserver>,
    ) -> Self {
        let audit = Arc::new(AuditLog::new(config.audit_log_capacity_non_zero()));
        let scheduler = Arc::new(CoalescingScheduler::new(config, backend, audit, observer));
        let trigger = Arc::new(PurgeTrigger::new(Arc::clone(&scheduler)));
        let events = Arc::new(ContentEvents::new());
        let subscription = events.subscribe(DEFAULT_PRIORITY, trigger.clone());

        Self {
            events,
            trigger,
            scheduler,
            subscription,
        }
    }

    /// Spawn the scheduler driver; it stops once `shutdown` resolves.
    pub fn start<F>(&self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Arc::clone(&self.scheduler).spawn(shutdown)
    }

    pub fn events(&self) -> &Arc<ContentEvents> {
        &self.events
    }

    pub fn trigger(&self) -> &Arc<PurgeTrigger> {
        &self.trigger
    }

    pub fn scheduler(&self) -> &Arc<CoalescingScheduler> {
        &self.scheduler
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        self.scheduler.audit()
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
}
