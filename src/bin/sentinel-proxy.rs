//! Pass-through proxy adapter for remote model hosts.

use std::process::ExitCode;

use sentinel_core::{proxy, Settings};
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

    tokio::select! {
        result = proxy::serve(settings.proxy) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "proxy failed");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; shutting down proxy");
            ExitCode::SUCCESS
        }
    }
}
