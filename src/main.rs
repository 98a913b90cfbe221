use std::{process, sync::Arc};

use async_trait::async_trait;
use purge_relay::{
    config::{self, Sources},
    domain::content::ContentTransitionEvent,
    infra::{error::InfraError, telemetry},
    purge::{BackendSlot, PurgeBackend, PurgeConfig, PurgeError, PurgeService},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

/// Logs instead of calling a CDN; stands in until a real client is installed.
struct DryRunBackend;

#[async_trait]
impl PurgeBackend for DryRunBackend {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn purge_everything(&self) -> Result<(), PurgeError> {
        info!(backend = self.name(), "Purge everything (dry run)");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_error(&error);
        process::exit(1);
    }
}

fn report_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "purge relay error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "purge relay error");
    });
}

async fn run() -> Result<(), InfraError> {
    let settings = config::load(&Sources::default())?;
    telemetry::init(&settings.logging)?;

    let slot = Arc::new(BackendSlot::with_backend(Arc::new(DryRunBackend)));
    let service = PurgeService::new(PurgeConfig::from(&settings.purge), slot);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let driver = service.start(async move {
        let _ = stop_rx.await;
    });

    info!(
        debounce_ms = service.scheduler().config().debounce_window_ms,
        min_interval_ms = service.scheduler().config().min_interval_ms,
        "Purge relay reading content events from stdin"
    );

    // One JSON-encoded content transition event per line.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<ContentTransitionEvent>(line) {
            Ok(event) => service.events().dispatch(&event),
            Err(err) => warn!(error = %err, "Skipping malformed content event"),
        }
    }

    // Input closed: flush whatever is still pending before exiting.
    loop {
        let snapshot = service.scheduler().snapshot();
        if snapshot.pending_requests == 0 && !snapshot.in_flight {
            break;
        }
        tokio::time::sleep(service.scheduler().config().in_flight_recheck()).await;
    }
    let _ = stop_tx.send(());
    if let Err(err) = driver.await {
        error!(error = %err, "Purge scheduler task failed");
    }

    info!(purges = service.audit().len(), "Purge relay stopped");
    Ok(())
}
