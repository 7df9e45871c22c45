//! Notification dispatcher: periodically turns new High/Critical scans
//! into tracker tickets or recurrence comments, with checkpointed
//! idempotence.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::Result;
use crate::scan::ScanResult;
use crate::store::{NewTicket, SentinelStore};

use super::filter::qualifying_vulnerabilities;
use super::tracker::{build_issue_description, build_issue_title, TicketSink};

/// How many unprocessed scans one tick consumes at most.
const SCAN_BATCH_LIMIT: usize = 50;

/// Outcome of one dispatcher tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub processed: usize,
    pub tickets_created: usize,
    pub comments_added: usize,
}

/// Periodic worker over the scan store.
///
/// Single-dispatcher deployment is assumed: checkpoints guard against
/// reprocessing, not against two racing instances.
pub struct Dispatcher {
    store: Arc<SentinelStore>,
    tracker: Arc<dyn TicketSink>,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SentinelStore>,
        tracker: Arc<dyn TicketSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            tracker,
            poll_interval,
        }
    }

    /// Run ticks on the configured interval until the task is dropped.
    pub async fn run_forever(&self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(summary) => info!(
                    processed = summary.processed,
                    tickets = summary.tickets_created,
                    comments = summary.comments_added,
                    "dispatcher tick complete"
                ),
                Err(e) => error!(error = %e, "dispatcher tick failed"),
            }
        }
    }

    /// One explicit pass over the unprocessed scans.
    pub async fn tick(&self) -> Result<TickSummary> {
        let scans = self.store.unprocessed_high_severity(SCAN_BATCH_LIMIT)?;
        if scans.is_empty() {
            return Ok(TickSummary::default());
        }

        let mut summary = TickSummary {
            processed: scans.len(),
            ..TickSummary::default()
        };

        for scan in &scans {
            self.process_scan(scan, &mut summary).await;

            // Checkpoint unconditionally, even after partial failures:
            // tracker retries already happened and a stuck scan must not
            // be retried forever.
            if let Err(e) = self.store.mark_scan_processed(scan.id) {
                error!(scan_id = scan.id, error = %e, "failed to checkpoint scan");
            }
        }

        Ok(summary)
    }

    async fn process_scan(&self, scan: &ScanResult, summary: &mut TickSummary) {
        let qualifying = qualifying_vulnerabilities(&scan.vulnerabilities, scan.severity);
        info!(
            scan_id = scan.id,
            repo = %scan.repo_name,
            qualifying = qualifying.len(),
            total = scan.vulnerabilities.len(),
            severity = %scan.severity,
            "processing scan"
        );

        for (index, vuln) in qualifying {
            let endpoint_or_file = vuln.endpoint_or_file().to_string();
            let kind = vuln.vulnerability_type.as_str().to_string();

            let existing = self
                .store
                .find_open_ticket(&scan.repo_name, &endpoint_or_file, &kind)
                .unwrap_or_else(|e| {
                    error!(error = %e, "open-ticket lookup failed");
                    None
                });

            match existing {
                Some(issue_key) => {
                    let comment = format!(
                        "Sentinel detected this vulnerability again.\n\
                         Scan ID: {}\nCommit: {}\nConfidence: {}%\nReasoning: {}",
                        scan.id, scan.commit_hash, vuln.confidence, vuln.reasoning
                    );
                    match self.tracker.add_comment(&issue_key, &comment).await {
                        Ok(()) => summary.comments_added += 1,
                        Err(e) => {
                            error!(%issue_key, error = %e, "failed to add recurrence comment")
                        }
                    }
                }
                None => {
                    let title = build_issue_title(scan.severity, &kind, &scan.repo_name);
                    let description = build_issue_description(vuln, scan);
                    match self
                        .tracker
                        .create_issue(&title, &description, scan.severity)
                        .await
                    {
                        Ok(issue_key) => {
                            if let Err(e) = self.store.save_ticket(&NewTicket {
                                scan_result_id: scan.id,
                                finding_index: index as i64,
                                repo_name: scan.repo_name.clone(),
                                vulnerability_type: vuln.vulnerability_type.clone(),
                                endpoint_or_file,
                                jira_issue_key: issue_key,
                                severity: scan.severity,
                            }) {
                                error!(error = %e, "failed to record ticket row");
                            }
                            summary.tickets_created += 1;
                        }
                        Err(e) => {
                            error!(scan_id = scan.id, index, error = %e, "failed to create ticket")
                        }
                    }
                }
            }
        }
    }
}
