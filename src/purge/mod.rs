//! Purge Relay pipeline
//!
//! Turns content publication events into full CDN purges:
//!
//! - **Filter**: decides which transitions warrant a purge
//! - **Scheduler**: debounces bursts, rate limits, keeps one purge in flight
//! - **Retry**: bounded exponential backoff around each backend call
//! - **Audit**: bounded in-memory history of attempts
//!
//! ## Configuration
//!
//! Pipeline behavior is controlled via `purge-relay.toml`:
//!
//! ```toml
//! [purge]
//! debounce_window_ms = 5000
//! min_interval_ms = 30000
//! max_retries = 2
//! # ... see config.rs for all options
//! ```

mod attempt;
mod audit;
mod backend;
mod config;
mod error;
mod events;
mod filter;
mod lock;
mod observer;
mod retry;
mod scheduler;
mod service;
mod trigger;

pub use attempt::{PurgeAttempt, PurgeOutcome, PurgeReason, PurgeRequest};
pub use audit::AuditLog;
pub use backend::{BackendSlot, PurgeBackend};
pub use config::PurgeConfig;
pub use error::PurgeError;
pub use events::{ContentEventHandler, ContentEvents, DEFAULT_PRIORITY, SubscriptionId};
pub use filter::{AcceptReason, EventFilter, FilterDecision, RejectReason};
pub use observer::{PurgeObserver, TracingObserver};
pub use retry::RetryPolicy;
pub use scheduler::{CoalescingScheduler, SchedulerSnapshot};
pub use service::PurgeService;
pub use trigger::PurgeTrigger;
