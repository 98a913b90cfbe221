//! Coalescing purge scheduler.
//!
//! Collapses bursts of purge requests into a single backend call, enforces a
//! minimum interval between successful purges and guarantees that at most one
//! purge is in flight at any time.
//!
//! All scheduler state lives behind one mutex. The lock is never held across
//! the backend call: a purge is marked in flight, the lock is released, and it
//! is re-acquired only to record completion.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use metrics::{counter, histogram};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};

use super::attempt::{PurgeAttempt, PurgeOutcome, PurgeRequest};
use super::audit::AuditLog;
use super::backend::BackendSlot;
use super::config::PurgeConfig;
use super::lock::mutex_lock;
use super::observer::PurgeObserver;
use super::retry::RetryPolicy;

const SOURCE: &str = "purge::scheduler";
const METRIC_PURGE_REQUESTS: &str = "purge_relay_requests_total";
const METRIC_PURGE_COALESCED: &str = "purge_relay_requests_coalesced_total";
const METRIC_PURGE_ATTEMPTS: &str = "purge_relay_attempts_total";
const METRIC_PURGE_MS: &str = "purge_relay_purge_ms";

#[derive(Debug, Default)]
struct SchedulerState {
    pending: Option<PurgeRequest>,
    in_flight: bool,
    last_purge_at: Option<Instant>,
    due_at: Option<Instant>,
}

/// Point-in-time copy of the scheduler state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSnapshot {
    pub pending_requests: usize,
    pub in_flight: bool,
    pub last_purge_at: Option<Instant>,
    pub due_at: Option<Instant>,
}

enum Step {
    Idle,
    WaitUntil(Instant),
    Fire(PurgeRequest),
}

pub struct CoalescingScheduler {
    config: PurgeConfig,
    retry: RetryPolicy,
    backend: Arc<BackendSlot>,
    audit: Arc<AuditLog>,
    observer: Arc<dyn PurgeObserver>,
    state: Mutex<SchedulerState>,
    wake: Notify,
}

impl CoalescingScheduler {
    pub fn new(
        config: PurgeConfig,
        backend: Arc<BackendSlot>,
        audit: Arc<AuditLog>,
        observer: Arc<dyn PurgeObserver>,
    ) -> Self {
        Self {
            retry: RetryPolicy::from(&config),
            config,
            backend,
            audit,
            observer,
            state: Mutex::new(SchedulerState::default()),
            wake: Notify::new(),
        }
    }

    /// Record that a purge is owed. Never blocks on the backend.
    ///
    /// A request arriving while another is pending is merged into it; the
    /// debounce deadline stays anchored to the first request of the burst.
    pub fn request_purge(&self, request: PurgeRequest) {
        if !self.config.enabled {
            debug!(reason = %request.reason, "Purge request ignored: purging disabled");
            return;
        }

        counter!(METRIC_PURGE_REQUESTS).increment(1);

        let mut state = mutex_lock(&self.state, SOURCE, "request_purge");
        match state.pending.take() {
            Some(pending) => {
                let merged = pending.merge(request);
                debug!(
                    reason = %merged.reason,
                    in_flight = state.in_flight,
                    "Purge request coalesced"
                );
                counter!(METRIC_PURGE_COALESCED).increment(1);
                state.pending = Some(merged);
            }
            None => {
                let due_at = request.requested_at + self.config.debounce_window();
                info!(
                    reason = %request.reason,
                    in_flight = state.in_flight,
                    debounce_ms = self.config.debounce_window_ms,
                    "Purge request enqueued"
                );
                state.pending = Some(request);
                state.due_at = Some(due_at);
            }
        }
        drop(state);

        self.wake.notify_one();
    }

    /// Perform the owed purge if it is due right now.
    ///
    /// Returns the attempt when a purge ran, `None` when nothing was due,
    /// the rate limit deferred it, or another purge is still in flight.
    pub async fn tick(&self) -> Option<PurgeAttempt> {
        match self.next_step(Instant::now()) {
            Step::Fire(request) => Some(self.fire(request).await),
            Step::Idle | Step::WaitUntil(_) => None,
        }
    }

    /// Drive the scheduler until `shutdown` resolves.
    ///
    /// A purge already issued to the backend is allowed to finish before the
    /// loop observes shutdown.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        debug!("Purge scheduler started");

        loop {
            match self.next_step(Instant::now()) {
                Step::Fire(request) => {
                    self.fire(request).await;
                }
                Step::Idle => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.wake.notified() => {}
                    }
                }
                Step::WaitUntil(deadline) => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep_until(deadline) => {}
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }

        debug!("Purge scheduler stopped");
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn<F>(self: Arc<Self>, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = mutex_lock(&self.state, SOURCE, "snapshot");
        SchedulerSnapshot {
            pending_requests: state
                .pending
                .as_ref()
                .map_or(0, |request| request.reason.request_count()),
            in_flight: state.in_flight,
            last_purge_at: state.last_purge_at,
            due_at: state.due_at,
        }
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn backend(&self) -> &Arc<BackendSlot> {
        &self.backend
    }

    /// Decide what to do at `now`, updating the deadline when deferring.
    fn next_step(&self, now: Instant) -> Step {
        let mut state = mutex_lock(&self.state, SOURCE, "next_step");

        if state.pending.is_none() {
            state.due_at = None;
            return Step::Idle;
        }
        let Some(due_at) = state.due_at else {
            return Step::Idle;
        };
        if due_at > now {
            return Step::WaitUntil(due_at);
        }

        if state.in_flight {
            let recheck_at = now + self.config.in_flight_recheck();
            state.due_at = Some(recheck_at);
            return Step::WaitUntil(recheck_at);
        }

        if let Some(last_purge_at) = state.last_purge_at {
            let allowed_at = last_purge_at + self.config.min_interval();
            if allowed_at > now {
                debug!(
                    wait_ms = allowed_at.duration_since(now).as_millis() as u64,
                    "Purge deferred by rate limit"
                );
                state.due_at = Some(allowed_at);
                return Step::WaitUntil(allowed_at);
            }
        }

        let Some(request) = state.pending.take() else {
            return Step::Idle;
        };
        state.in_flight = true;
        state.due_at = None;
        Step::Fire(request)
    }

    #[instrument(skip(self, request), fields(reason = %request.reason))]
    async fn fire(&self, request: PurgeRequest) -> PurgeAttempt {
        info!(
            requests = request.reason.request_count(),
            waited_ms = request.requested_at.elapsed().as_millis() as u64,
            "Cache purge starting"
        );

        let guard = InFlight::new(self, request.clone());
        let attempt = match self.backend.resolve() {
            Ok(backend) => self.retry.execute(backend.as_ref(), request.reason).await,
            Err(err) => {
                warn!(error = %err, "Cache purge skipped");
                PurgeAttempt::finish(
                    request.reason,
                    Instant::now(),
                    PurgeOutcome::Failure(err),
                    0,
                )
            }
        };
        guard.complete(&attempt);

        counter!(METRIC_PURGE_ATTEMPTS, "outcome" => attempt.outcome.label()).increment(1);
        histogram!(METRIC_PURGE_MS, "outcome" => attempt.outcome.label())
            .record(attempt.elapsed_ms());
        self.audit.record(attempt.clone());
        self.notify_observer(&attempt);

        attempt
    }

    fn notify_observer(&self, attempt: &PurgeAttempt) {
        let delivered = catch_unwind(AssertUnwindSafe(|| self.observer.on_attempt(attempt)));
        if delivered.is_err() {
            warn!(attempt_id = %attempt.id, "Purge observer panicked");
        }
    }

    fn complete(&self, attempt: &PurgeAttempt) {
        let mut state = mutex_lock(&self.state, SOURCE, "complete");
        state.in_flight = false;
        if attempt.is_success() {
            state.last_purge_at = Some(attempt.finished_at);
        }
        if state.pending.is_some() {
            state.due_at = Some(Instant::now() + self.config.debounce_window());
        }
        drop(state);

        self.wake.notify_one();
    }

    /// The purge future was dropped mid-flight: give the request back and
    /// re-arm, leaving the rate limit anchor untouched.
    fn abandon(&self, request: PurgeRequest) {
        let mut state = mutex_lock(&self.state, SOURCE, "abandon");
        state.in_flight = false;
        state.pending = Some(match state.pending.take() {
            Some(pending) => request.merge(pending),
            None => request,
        });
        state.due_at = Some(Instant::now() + self.config.debounce_window());
        drop(state);

        warn!("Cache purge cancelled while in flight; request re-queued");
        self.wake.notify_one();
    }
}

/// Owns the in-flight mark for one purge until it completes.
struct InFlight<'a> {
    scheduler: &'a CoalescingScheduler,
    request: Option<PurgeRequest>,
}

impl<'a> InFlight<'a> {
    fn new(scheduler: &'a CoalescingScheduler, request: PurgeRequest) -> Self {
        Self {
            scheduler,
            request: Some(request),
        }
    }

    fn complete(mut self, attempt: &PurgeAttempt) {
        self.request = None;
        self.scheduler.complete(attempt);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.scheduler.abandon(request);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::{advance, timeout};

    use super::*;
    use crate::purge::attempt::PurgeReason;
    use crate::purge::backend::PurgeBackend;
    use crate::purge::error::PurgeError;
    use crate::purge::observer::TracingObserver;

    const DEBOUNCE: Duration = Duration::from_secs(5);
    const MIN_INTERVAL: Duration = Duration::from_secs(30);

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PurgeBackend for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn purge_everything(&self) -> Result<(), PurgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PurgeError::failure("edge rejected purge"))
            } else {
                Ok(())
            }
        }
    }

    /// Blocks inside the backend call until released.
    #[derive(Default)]
    struct Gate {
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PurgeBackend for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        async fn purge_everything(&self) -> Result<(), PurgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    /// Takes two seconds per call.
    #[derive(Default)]
    struct Slow {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PurgeBackend for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn purge_everything(&self) -> Result<(), PurgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(())
        }
    }

    struct PanickingObserver;

    impl PurgeObserver for PanickingObserver {
        fn on_attempt(&self, _attempt: &PurgeAttempt) {
            panic!("observer failed");
        }
    }

    fn config() -> PurgeConfig {
        PurgeConfig {
            debounce_window_ms: 5_000,
            min_interval_ms: 30_000,
            purge_timeout_ms: 60_000,
            ..Default::default()
        }
    }

    fn scheduler_with(config: PurgeConfig, slot: BackendSlot) -> CoalescingScheduler {
        CoalescingScheduler::new(
            config,
            Arc::new(slot),
            Arc::new(AuditLog::default()),
            Arc::new(TracingObserver),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_purge() {
        let backend = Arc::new(Counting::default());
        let scheduler = scheduler_with(config(), BackendSlot::with_backend(backend.clone()));

        for id in 0..25u64 {
            scheduler.request_purge(PurgeRequest::for_content(id));
            advance(Duration::from_millis(100)).await;
        }
        assert_eq!(scheduler.snapshot().pending_requests, 25);
        assert!(scheduler.tick().await.is_none());

        advance(DEBOUNCE).await;
        let attempt = scheduler.tick().await.expect("purge should be due");

        assert!(attempt.is_success());
        assert_eq!(attempt.reason, PurgeReason::Batch { requests: 25 });
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(scheduler.tick().await.is_none());
        assert_eq!(scheduler.snapshot().pending_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_is_anchored_to_first_request() {
        let slot = BackendSlot::with_backend(Arc::new(Counting::default()));
        let scheduler = scheduler_with(config(), slot);

        let first = PurgeRequest::for_content(1u64);
        let expected_due = first.requested_at + DEBOUNCE;
        scheduler.request_purge(first);
        advance(Duration::from_secs(3)).await;
        scheduler.request_purge(PurgeRequest::for_content(2u64));

        assert_eq!(scheduler.snapshot().due_at, Some(expected_due));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_purges_respect_min_interval() {
        let backend = Arc::new(Counting::default());
        let scheduler = scheduler_with(config(), BackendSlot::with_backend(backend.clone()));

        scheduler.request_purge(PurgeRequest::for_content(1u64));
        advance(DEBOUNCE).await;
        let first = scheduler.tick().await.expect("first purge");

        scheduler.request_purge(PurgeRequest::for_content(2u64));
        advance(DEBOUNCE).await;
        assert!(scheduler.tick().await.is_none());
        assert_eq!(
            scheduler.snapshot().due_at,
            Some(first.finished_at + MIN_INTERVAL)
        );

        advance(MIN_INTERVAL - DEBOUNCE).await;
        let second = scheduler.tick().await.expect("second purge");

        assert!(second.started_at.duration_since(first.finished_at) >= MIN_INTERVAL);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_does_not_move_rate_limit_anchor() {
        let backend = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let scheduler = scheduler_with(
            PurgeConfig {
                max_retries: 0,
                ..config()
            },
            BackendSlot::with_backend(backend.clone()),
        );

        scheduler.request_purge(PurgeRequest::for_content(1u64));
        advance(DEBOUNCE).await;
        let failed = scheduler.tick().await.expect("failed purge");
        assert!(!failed.is_success());
        assert_eq!(scheduler.snapshot().last_purge_at, None);

        scheduler.request_purge(PurgeRequest::for_content(1u64));
        advance(DEBOUNCE).await;
        assert!(scheduler.tick().await.is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_failure_lands_in_audit_log() {
        let backend = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let scheduler = scheduler_with(config(), BackendSlot::with_backend(backend.clone()));

        scheduler.request_purge(PurgeRequest::for_content(9u64));
        advance(DEBOUNCE).await;
        let attempt = scheduler.tick().await.expect("purge attempt");

        assert_eq!(attempt.retry_count, 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        let recent = scheduler.audit().recent(10);
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_backend_is_skipped_without_retry() {
        let scheduler = scheduler_with(config(), BackendSlot::empty());

        scheduler.request_purge(PurgeRequest::for_content(1u64));
        advance(DEBOUNCE).await;
        let attempt = scheduler.tick().await.expect("skipped attempt");

        assert_eq!(attempt.retry_count, 0);
        assert_eq!(
            attempt.outcome.error().map(PurgeError::kind),
            Some("backend_unavailable")
        );
        assert_eq!(scheduler.audit().len(), 1);
        assert!(!scheduler.snapshot().in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_scheduler_ignores_requests() {
        let scheduler = scheduler_with(
            PurgeConfig {
                enabled: false,
                ..config()
            },
            BackendSlot::with_backend(Arc::new(Counting::default())),
        );

        scheduler.request_purge(PurgeRequest::for_content(1u64));

        assert_eq!(scheduler.snapshot().pending_requests, 0);
        advance(DEBOUNCE).await;
        assert!(scheduler.tick().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn never_runs_two_purges_at_once() {
        let gate = Arc::new(Gate::default());
        let scheduler = Arc::new(scheduler_with(
            PurgeConfig {
                min_interval_ms: 0,
                ..config()
            },
            BackendSlot::with_backend(gate.clone()),
        ));

        scheduler.request_purge(PurgeRequest::for_content(1u64));
        advance(DEBOUNCE).await;
        let running = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.tick().await }
        });
        gate.entered.notified().await;

        scheduler.request_purge(PurgeRequest::for_content(2u64));
        advance(DEBOUNCE).await;
        assert!(scheduler.tick().await.is_none());
        assert!(scheduler.snapshot().in_flight);

        gate.release.notify_one();
        let first = running
            .await
            .expect("tick task")
            .expect("first purge attempt");
        assert!(first.is_success());

        let snapshot = scheduler.snapshot();
        assert!(!snapshot.in_flight);
        assert_eq!(snapshot.pending_requests, 1);

        gate.release.notify_one();
        advance(DEBOUNCE).await;
        assert!(scheduler.tick().await.is_some());
        assert_eq!(gate.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn driver_loop_fires_once_per_burst() {
        let backend = Arc::new(Counting::default());
        let slot = BackendSlot::with_backend(backend.clone());
        let scheduler = Arc::new(scheduler_with(config(), slot));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let driver = Arc::clone(&scheduler).spawn(async move {
            let _ = stop_rx.await;
        });

        for id in 0..10u64 {
            scheduler.request_purge(PurgeRequest::for_content(id));
        }
        tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.audit().len(), 1);

        stop_tx.send(()).expect("driver still running");
        driver.await.expect("driver task");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_tick_releases_in_flight_mark() {
        let backend = Arc::new(Slow::default());
        let scheduler = scheduler_with(config(), BackendSlot::with_backend(backend.clone()));

        scheduler.request_purge(PurgeRequest::for_content(1u64));
        advance(DEBOUNCE).await;
        let cancelled = timeout(Duration::from_millis(100), scheduler.tick()).await;
        assert!(cancelled.is_err());

        let snapshot = scheduler.snapshot();
        assert!(!snapshot.in_flight);
        assert_eq!(snapshot.pending_requests, 1);
        assert_eq!(snapshot.last_purge_at, None);
        assert!(scheduler.audit().is_empty());

        scheduler.request_purge(PurgeRequest::for_content(2u64));
        advance(DEBOUNCE).await;
        let attempt = scheduler.tick().await.expect("re-queued purge");

        assert!(attempt.is_success());
        assert_eq!(attempt.reason, PurgeReason::Batch { requests: 2 });
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(!scheduler.snapshot().in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_panic_keeps_driver_alive() {
        let backend = Arc::new(Counting::default());
        let scheduler = Arc::new(CoalescingScheduler::new(
            PurgeConfig {
                min_interval_ms: 0,
                ..config()
            },
            Arc::new(BackendSlot::with_backend(backend.clone())),
            Arc::new(AuditLog::default()),
            Arc::new(PanickingObserver),
        ));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let driver = Arc::clone(&scheduler).spawn(async move {
            let _ = stop_rx.await;
        });

        scheduler.request_purge(PurgeRequest::for_content(1u64));
        tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;
        scheduler.request_purge(PurgeRequest::for_content(2u64));
        tokio::time::sleep(DEBOUNCE + Duration::from_secs(1)).await;

        assert!(!driver.is_finished());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.audit().len(), 2);
        assert_eq!(scheduler.snapshot().pending_requests, 0);

        stop_tx.send(()).expect("driver still running");
        driver.await.expect("driver task");
    }
}
