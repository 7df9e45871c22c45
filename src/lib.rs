//! # sentinel-core
//!
//! An autonomous code-security pipeline. Given a repository reference,
//! the crate statically extracts HTTP endpoints and notable functions,
//! submits each to an ensemble of LLM reviewers, reconciles their
//! verdicts into one confirmed vulnerability list, scores the result, and
//! persists it. Two independent consumers read the store: a notification
//! dispatcher that files deduplicated tracker tickets, and a red-team
//! simulator that exercises attack templates against confirmed findings.
//!
//! ## Core Components
//!
//! - **extract**: structural extraction of endpoints and functions
//! - **llm**: the reviewer gateway (two primaries plus a cloud validator)
//! - **consensus**: verdict parsing and the multi-stage decision tree
//! - **scan**: the end-to-end orchestrator with capped fan-out
//! - **notify**: the periodic ticket dispatcher
//! - **redteam**: the attack simulator
//!
//! ## Example
//!
//! ```rust,ignore
//! use sentinel_core::{
//!     ConsensusEngine, ReviewerGateway, ScanOrchestrator, ScanRequest,
//!     SentinelStore, Settings,
//! };
//! use std::sync::Arc;
//!
//! let settings = Settings::from_env();
//! let store = Arc::new(SentinelStore::open(&settings.db_path)?);
//! let gateway = Arc::new(ReviewerGateway::from_settings(&settings.llm));
//! let engine = Arc::new(ConsensusEngine::new(gateway));
//!
//! let orchestrator = ScanOrchestrator::new(engine, store);
//! let summary = orchestrator.run(&ScanRequest::new("acme/shop")).await?;
//! println!("score: {} ({})", summary.score, summary.severity);
//! ```

pub mod config;
pub mod consensus;
pub mod error;
pub mod extract;
pub mod llm;
pub mod notify;
pub mod proxy;
pub mod redteam;
pub mod scan;
pub mod score;
pub mod store;
pub mod webhook;

// Re-exports for convenience
pub use config::{
    DispatcherSettings, LlmSettings, ProxySettings, Settings, TrackerSettings, WebhookSettings,
};
pub use consensus::{decide, parse_verdict, ConsensusEngine, Provenance, Review, Verdict, VulnKind};
pub use error::{Error, Result};
pub use extract::{collect_items, extract_file, is_security_relevant, SourceItem};
pub use llm::{ChatCompletionsClient, CompletionBackend, GeminiValidator, ReviewerGateway};
pub use notify::{Dispatcher, TickSummary, TicketSink, TrackerClient, TrackerStatus};
pub use redteam::{AttackResult, AttackSimulator, CycleReport, ModelFilter};
pub use scan::{
    ArchiveFetcher, ScanOrchestrator, ScanRequest, ScanResult, ScanSummary, Vulnerability,
    MAX_IN_FLIGHT_REVIEWS,
};
pub use score::{calculate_score, RiskAssessment, Severity};
pub use store::{Finding, FindingStatus, FindingUpdate, NewFinding, NewScan, SentinelStore};
pub use webhook::{evaluate as evaluate_webhook, verify_signature, WebhookDecision};
