use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the purge pipeline emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "purge_relay_requests_total",
            Unit::Count,
            "Total number of purge requests accepted by the scheduler."
        );
        describe_counter!(
            "purge_relay_requests_coalesced_total",
            Unit::Count,
            "Total number of purge requests merged into an already pending purge."
        );
        describe_counter!(
            "purge_relay_events_rejected_total",
            Unit::Count,
            "Total number of content events the filter decided not to purge for."
        );
        describe_counter!(
            "purge_relay_attempts_total",
            Unit::Count,
            "Total number of purge attempts, labelled by outcome."
        );
        describe_counter!(
            "purge_relay_retries_total",
            Unit::Count,
            "Total number of backend calls retried after a failure."
        );
        describe_histogram!(
            "purge_relay_purge_ms",
            Unit::Milliseconds,
            "Purge attempt latency in milliseconds, including retries."
        );
    });
}
