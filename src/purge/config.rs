//! Purge pipeline configuration.
//!
//! Controls debouncing, rate limiting, retries and audit retention via the
//! `[purge]` table of `purge-relay.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for purge configuration
const DEFAULT_DEBOUNCE_WINDOW_MS: u64 = 5_000;
const DEFAULT_MIN_INTERVAL_MS: u64 = 30_000;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_AUDIT_LOG_CAPACITY: usize = 100;
const DEFAULT_PURGE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_IN_FLIGHT_RECHECK_MS: u64 = 500;

/// Runtime configuration of the purge pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PurgeConfig {
    /// Accept purge requests at all.
    pub enabled: bool,
    /// Delay (ms) after the first request of a burst before purging.
    pub debounce_window_ms: u64,
    /// Minimum time (ms) between the end of a successful purge and the next start.
    pub min_interval_ms: u64,
    /// Retries after the first failed backend call.
    pub max_retries: u32,
    /// First retry delay (ms); doubles on each further retry.
    pub backoff_base_ms: u64,
    /// Maximum attempts kept in the audit log.
    pub audit_log_capacity: usize,
    /// Upper bound (ms) on a single backend call.
    pub purge_timeout_ms: u64,
    /// Delay (ms) before re-checking when a purge is still in flight.
    pub in_flight_recheck_ms: u64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            audit_log_capacity: DEFAULT_AUDIT_LOG_CAPACITY,
            purge_timeout_ms: DEFAULT_PURGE_TIMEOUT_MS,
            in_flight_recheck_ms: DEFAULT_IN_FLIGHT_RECHECK_MS,
        }
    }
}

impl From<&crate::config::PurgeSettings> for PurgeConfig {
    fn from(settings: &crate::config::PurgeSettings) -> Self {
        Self {
            enabled: settings.enabled,
            debounce_window_ms: duration_ms(settings.debounce_window),
            min_interval_ms: duration_ms(settings.min_interval),
            max_retries: settings.max_retries,
            backoff_base_ms: duration_ms(settings.backoff_base),
            audit_log_capacity: settings.audit_log_capacity.get(),
            purge_timeout_ms: duration_ms(settings.purge_timeout),
            in_flight_recheck_ms: duration_ms(settings.in_flight_recheck),
        }
    }
}

fn duration_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

impl PurgeConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn purge_timeout(&self) -> Duration {
        Duration::from_millis(self.purge_timeout_ms)
    }

    /// Never zero, so a busy scheduler cannot spin.
    pub fn in_flight_recheck(&self) -> Duration {
        Duration::from_millis(self.in_flight_recheck_ms.max(1))
    }

    /// Returns the audit capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn audit_log_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.audit_log_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
