//! Notification dispatcher daemon: polls for new High/Critical scans and
//! files tracker tickets until interrupted.

use std::process::ExitCode;
use std::sync::Arc;

use sentinel_core::{Dispatcher, SentinelStore, Settings, TrackerClient, TrackerStatus};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let settings = Settings::from_env();
    let store = match SentinelStore::open(&settings.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            return ExitCode::FAILURE;
        }
    };

    // Operator-saved tracker config takes precedence over the environment.
    let tracker_settings = match store.load_tracker_config() {
        Ok(Some(saved)) => saved,
        _ => settings.tracker.clone(),
    };
    let tracker = Arc::new(TrackerClient::new(tracker_settings));

    match tracker.connectivity().await {
        TrackerStatus::Connected { user } => tracing::info!(%user, "tracker connected"),
        TrackerStatus::NotConfigured => {
            tracing::warn!("tracker credentials not configured; ticket creation will fail")
        }
        TrackerStatus::Error(message) => tracing::warn!(%message, "tracker connectivity check failed"),
    }

    let dispatcher = Dispatcher::new(store, tracker, settings.dispatcher.poll_interval);
    tracing::info!(
        interval_secs = settings.dispatcher.poll_interval.as_secs(),
        "notification dispatcher started"
    );

    tokio::select! {
        _ = dispatcher.run_forever() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; shutting down dispatcher");
        }
    }

    ExitCode::SUCCESS
}
