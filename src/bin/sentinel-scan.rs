//! One-shot scan worker: runs a full security scan for a repository
//! reference given on the command line.
//!
//! Usage: sentinel-scan <owner/repo> [branch] [commit]

use std::process::ExitCode;
use std::sync::Arc;

use sentinel_core::{
    ConsensusEngine, ReviewerGateway, ScanOrchestrator, ScanRequest, SentinelStore, Settings,
};
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

    let mut args = std::env::args().skip(1);
    let Some(repo) = args.next() else {
        eprintln!("usage: sentinel-scan <owner/repo> [branch] [commit]");
        return ExitCode::from(2);
    };

    let mut request = ScanRequest::new(repo);
    if let Some(branch) = args.next() {
        request = request.with_branch(branch);
    }
    if let Some(commit) = args.next() {
        request = request.with_commit(commit);
    }

    let settings = Settings::from_env();
    let store = match SentinelStore::open(&settings.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            return ExitCode::FAILURE;
        }
    };

    let gateway = Arc::new(ReviewerGateway::from_settings(&settings.llm));
    let engine = Arc::new(ConsensusEngine::new(gateway));
    let orchestrator = ScanOrchestrator::new(engine, store)
        .with_dependency_marker(&settings.dependency_marker);

    match orchestrator.run(&request).await {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "scan failed");
            ExitCode::FAILURE
        }
    }
}
