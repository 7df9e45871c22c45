//! End-to-end scan orchestration: fetch → extract → fan out → consensus →
//! score → persist.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::info;

use crate::consensus::{ConsensusEngine, Review};
use crate::extract::{collect_items, is_security_relevant, SourceItem};
use crate::score::calculate_score;
use crate::store::{NewScan, SentinelStore};

use super::archive::ArchiveFetcher;
use super::types::{ScanRequest, ScanSummary, Vulnerability};
use crate::error::Result;

/// Hard cap on in-flight reviewer calls within one scan.
pub const MAX_IN_FLIGHT_REVIEWS: usize = 5;

/// Confirmed vulnerabilities must clear this confidence.
const CONFIDENCE_FLOOR: u8 = 55;

/// Drives one scan from repository reference to persisted result.
pub struct ScanOrchestrator {
    engine: Arc<ConsensusEngine>,
    store: Arc<SentinelStore>,
    fetcher: ArchiveFetcher,
    dependency_marker: String,
    max_in_flight: usize,
}

impl ScanOrchestrator {
    pub fn new(engine: Arc<ConsensusEngine>, store: Arc<SentinelStore>) -> Self {
        Self {
            engine,
            store,
            fetcher: ArchiveFetcher::new(),
            dependency_marker: "Depends".to_string(),
            max_in_flight: MAX_IN_FLIGHT_REVIEWS,
        }
    }

    pub fn with_fetcher(mut self, fetcher: ArchiveFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_dependency_marker(mut self, marker: impl Into<String>) -> Self {
        self.dependency_marker = marker.into();
        self
    }

    /// Run one scan end to end. Archive and storage failures abort with an
    /// error; individual reviewer failures never do.
    pub async fn run(&self, request: &ScanRequest) -> Result<ScanSummary> {
        info!(repo = %request.repo_name, branch = %request.branch, "starting security scan");

        let bytes = self
            .fetcher
            .download(&request.repo_name, &request.branch)
            .await?;

        // Scoped workspace, removed on every exit path when dropped.
        let workspace = tempfile::tempdir()?;
        ArchiveFetcher::unpack(&bytes, workspace.path())?;

        let items = collect_items(workspace.path(), &self.dependency_marker);
        drop(workspace);

        self.process_items(request, items).await
    }

    /// Scan continuation once items are extracted (also the test seam).
    async fn process_items(
        &self,
        request: &ScanRequest,
        items: Vec<SourceItem>,
    ) -> Result<ScanSummary> {
        let total_extracted = items.len();
        let relevant: Vec<SourceItem> = items.into_iter().filter(is_security_relevant).collect();
        info!(
            repo = %request.repo_name,
            extracted = total_extracted,
            relevant = relevant.len(),
            "extraction complete"
        );

        let vulnerabilities = if relevant.is_empty() {
            Vec::new()
        } else {
            let reviews = review_items(&self.engine, &relevant, self.max_in_flight).await;
            confirmed_vulnerabilities(&relevant, reviews)
        };

        let assessment = calculate_score(&vulnerabilities);
        info!(
            repo = %request.repo_name,
            score = assessment.score,
            severity = %assessment.severity,
            vulnerabilities = vulnerabilities.len(),
            "scan complete"
        );

        let scan_id = self.store.insert_scan(&NewScan {
            repo_name: request.repo_name.clone(),
            commit_hash: request.commit_hash.clone(),
            auth_integrity_score: assessment.score,
            drift_delta: total_extracted as i64,
            severity: assessment.severity,
            vulnerabilities: vulnerabilities.clone(),
        })?;

        Ok(ScanSummary {
            scan_id,
            score: assessment.score,
            severity: assessment.severity,
            items_extracted: total_extracted,
            items_analyzed: relevant.len(),
            vulnerabilities_found: vulnerabilities.len(),
        })
    }
}

/// Fan the items out to the consensus engine under a counting semaphore.
/// Results come back zipped to their items by position, never by
/// completion order.
async fn review_items(
    engine: &ConsensusEngine,
    items: &[SourceItem],
    max_in_flight: usize,
) -> Vec<Review> {
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));

    let tasks = items.iter().map(|item| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("semaphore closed unexpectedly");
            engine.analyze(item).await
        }
    });

    join_all(tasks).await
}

/// Keep reviews with a positive provenance tag, an asserted vulnerability,
/// and confidence above the floor.
fn confirmed_vulnerabilities(items: &[SourceItem], reviews: Vec<Review>) -> Vec<Vulnerability> {
    items
        .iter()
        .zip(reviews)
        .filter_map(|(item, review)| {
            if !review.provenance.is_positive() {
                return None;
            }
            let verdict = review.verdict;
            if !verdict.has_vulnerability || verdict.confidence <= CONFIDENCE_FLOOR {
                return None;
            }
            Some(Vulnerability {
                function_name: item.function_name.clone(),
                method: item.method.clone(),
                path: item.path.clone(),
                file_path: item.file_path.clone(),
                vulnerability_type: verdict.kind,
                confidence: verdict.confidence,
                reasoning: verdict.reasoning,
                validated_by: review.provenance,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{Provenance, Verdict, VulnKind};
    use crate::error::{Error, Result};
    use crate::llm::{CompletionBackend, ReviewerGateway};
    use crate::score::Severity;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const BOLA_80: &str =
        r#"{"has_vulnerability": true, "vulnerability_type": "BOLA", "confidence": 80, "reasoning": "no owner check"}"#;
    const BOLA_70: &str =
        r#"{"has_vulnerability": true, "vulnerability_type": "BOLA", "confidence": 70, "reasoning": "raw id"}"#;
    const CLEAN: &str =
        r#"{"has_vulnerability": false, "vulnerability_type": "None", "confidence": 0, "reasoning": "ok"}"#;

    /// Backend that records peak concurrency while pausing briefly.
    struct GaugeBackend {
        reply: &'static str,
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl GaugeBackend {
        fn new(reply: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
            let peak = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    reply,
                    current: Arc::new(AtomicUsize::new(0)),
                    peak: Arc::clone(&peak),
                }),
                peak,
            )
        }
    }

    #[async_trait]
    impl CompletionBackend for GaugeBackend {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }

        fn name(&self) -> &str {
            "gauge"
        }
    }

    struct StaticBackend(&'static str);

    #[async_trait]
    impl CompletionBackend for StaticBackend {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl CompletionBackend for FailingBackend {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::llm("failing", "connection refused"))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn engine_with(
        primary: Arc<dyn CompletionBackend>,
        secondary: Arc<dyn CompletionBackend>,
    ) -> Arc<ConsensusEngine> {
        Arc::new(ConsensusEngine::new(Arc::new(ReviewerGateway::new(
            primary, secondary, None,
        ))))
    }

    fn endpoint_item(name: &str, path: &str) -> SourceItem {
        SourceItem {
            function_name: name.to_string(),
            method: "GET".to_string(),
            path: path.to_string(),
            guards: vec![],
            arguments: vec![],
            code: format!("def {name}(item_id, db):\n    return db.query(Item).get(item_id)"),
            file_path: "app/api.py".to_string(),
            is_endpoint: true,
        }
    }

    fn orchestrator(
        engine: Arc<ConsensusEngine>,
        store: Arc<SentinelStore>,
    ) -> ScanOrchestrator {
        ScanOrchestrator::new(engine, store)
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_cap() {
        let (primary, peak_a) = GaugeBackend::new(BOLA_80);
        let (secondary, peak_b) = GaugeBackend::new(BOLA_70);
        let engine = engine_with(primary, secondary);

        let items: Vec<SourceItem> = (0..25)
            .map(|i| endpoint_item(&format!("handler_{i}"), &format!("/r/{i}")))
            .collect();

        let reviews = review_items(&engine, &items, MAX_IN_FLIGHT_REVIEWS).await;
        assert_eq!(reviews.len(), items.len());
        // Each in-flight item makes two reviewer calls at once, so each
        // backend sees at most the semaphore bound.
        assert!(peak_a.load(Ordering::SeqCst) <= MAX_IN_FLIGHT_REVIEWS);
        assert!(peak_b.load(Ordering::SeqCst) <= MAX_IN_FLIGHT_REVIEWS);
    }

    #[tokio::test]
    async fn results_zip_back_by_position() {
        let engine = engine_with(Arc::new(StaticBackend(BOLA_80)), Arc::new(StaticBackend(BOLA_70)));

        let mut items = vec![endpoint_item("flagged", "/flagged")];
        let mut empty = endpoint_item("skipped", "/skipped");
        empty.code = String::new();
        items.push(empty);

        let reviews = review_items(&engine, &items, 5).await;
        assert_eq!(reviews[0].provenance, Provenance::Consensus);
        assert_eq!(reviews[1].provenance, Provenance::Skipped);
    }

    #[test]
    fn confirmed_filter_applies_tag_flag_and_floor() {
        let items = vec![
            endpoint_item("a", "/a"),
            endpoint_item("b", "/b"),
            endpoint_item("c", "/c"),
        ];
        let reviews = vec![
            Review::new(
                Verdict {
                    has_vulnerability: true,
                    kind: VulnKind::Bola,
                    confidence: 86,
                    reasoning: "r".to_string(),
                },
                Provenance::Consensus,
            ),
            // Positive tag but at the floor: dropped.
            Review::new(
                Verdict {
                    has_vulnerability: true,
                    kind: VulnKind::Idor,
                    confidence: 55,
                    reasoning: "r".to_string(),
                },
                Provenance::Judged,
            ),
            Review::clean(),
        ];

        let confirmed = confirmed_vulnerabilities(&items, reviews);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].function_name, "a");
        assert_eq!(confirmed[0].validated_by, Provenance::Consensus);
    }

    #[tokio::test]
    async fn empty_item_set_scores_perfect_and_persists() {
        let engine = engine_with(Arc::new(FailingBackend), Arc::new(FailingBackend));
        let store = Arc::new(SentinelStore::in_memory().unwrap());
        let orchestrator = orchestrator(engine, Arc::clone(&store));

        let request = ScanRequest::new("acme/empty").with_commit("c0ffee");
        let summary = orchestrator
            .process_items(&request, Vec::new())
            .await
            .unwrap();

        assert_eq!(summary.score, 100);
        assert_eq!(summary.severity, Severity::Low);
        assert_eq!(summary.vulnerabilities_found, 0);

        let stored = store.get_scan(summary.scan_id).unwrap().unwrap();
        assert_eq!(stored.auth_integrity_score, 100);
        assert_eq!(stored.severity, Severity::Low);
        assert!(stored.vulnerabilities.is_empty());
    }

    #[tokio::test]
    async fn agreeing_reviewers_persist_a_medium_scan() {
        // Mistral 80 + Qwen 70 => consensus 86; 100 - floor(25*86/100) = 79.
        let engine = engine_with(Arc::new(StaticBackend(BOLA_80)), Arc::new(StaticBackend(BOLA_70)));
        let store = Arc::new(SentinelStore::in_memory().unwrap());
        let orchestrator = orchestrator(engine, Arc::clone(&store));

        let request = ScanRequest::new("acme/shop").with_commit("abc123");
        let items = vec![endpoint_item("get_user", "/users/{id}")];
        let summary = orchestrator.process_items(&request, items).await.unwrap();

        assert_eq!(summary.score, 79);
        assert_eq!(summary.severity, Severity::Medium);
        assert_eq!(summary.vulnerabilities_found, 1);
        assert_eq!(summary.items_extracted, 1);

        let stored = store.get_scan(summary.scan_id).unwrap().unwrap();
        assert_eq!(stored.vulnerabilities[0].confidence, 86);
        assert_eq!(stored.vulnerabilities[0].vulnerability_type, VulnKind::Bola);
        assert_eq!(stored.drift_delta, 1);
        assert_eq!(stored.severity, Severity::band(stored.auth_integrity_score));
    }

    #[tokio::test]
    async fn reviewer_failures_leave_the_scan_clean() {
        let engine = engine_with(Arc::new(FailingBackend), Arc::new(StaticBackend(CLEAN)));
        let store = Arc::new(SentinelStore::in_memory().unwrap());
        let orchestrator = orchestrator(engine, Arc::clone(&store));

        let request = ScanRequest::new("acme/quiet");
        let items = vec![endpoint_item("list_items", "/items")];
        let summary = orchestrator.process_items(&request, items).await.unwrap();

        assert_eq!(summary.vulnerabilities_found, 0);
        assert_eq!(summary.score, 100);
    }
}
