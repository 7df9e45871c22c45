//! SQLite-backed sentinel store.
//!
//! The store is the join point between the scan orchestrator and its two
//! consumers (dispatcher, simulator). All writes are single statements or
//! single transactions; the processed-scan checkpoint uses INSERT OR
//! IGNORE as the sole idempotence guarantee.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::TrackerSettings;
use crate::error::{Error, Result};
use crate::scan::{ScanResult, Vulnerability};
use crate::score::Severity;
use crate::store::schema::{initialize_schema, is_initialized};
use crate::store::types::{Finding, FindingStatus, FindingUpdate, NewFinding, NewScan, NewTicket};

/// Shared handle to the sentinel database.
pub struct SentinelStore {
    conn: Arc<Mutex<Connection>>,
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
        })
}

fn conversion_error(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

impl SentinelStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("failed to lock connection: {e}")))?;
        f(&mut conn).map_err(|e| Error::Storage(e.to_string()))
    }

    // ==================== Scan results ====================

    /// Persist one completed scan in a single statement.
    ///
    /// Severity is derived at the call site from the score and never
    /// mutated afterwards.
    pub fn insert_scan(&self, scan: &NewScan) -> Result<i64> {
        let vulns_json = serde_json::to_string(&scan.vulnerabilities)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scan_results
                    (repo_name, commit_hash, timestamp, auth_integrity_score,
                     drift_delta, severity, vulnerabilities)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    scan.repo_name,
                    scan.commit_hash,
                    Utc::now().to_rfc3339(),
                    scan.auth_integrity_score as i64,
                    scan.drift_delta,
                    scan.severity.as_str(),
                    vulns_json,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn row_to_scan(row: &Row<'_>) -> rusqlite::Result<ScanResult> {
        let timestamp: String = row.get(3)?;
        let severity: String = row.get(6)?;
        let vulns_json: String = row.get(7)?;

        let vulnerabilities: Vec<Vulnerability> =
            serde_json::from_str(&vulns_json).map_err(conversion_error)?;

        Ok(ScanResult {
            id: row.get(0)?,
            repo_name: row.get(1)?,
            commit_hash: row.get(2)?,
            timestamp: parse_timestamp(&timestamp).map_err(conversion_error)?,
            auth_integrity_score: row.get::<_, i64>(4)?.clamp(0, 100) as u8,
            drift_delta: row.get(5)?,
            severity: Severity::parse(&severity).unwrap_or(Severity::Low),
            vulnerabilities,
        })
    }

    const SCAN_COLUMNS: &'static str = "id, repo_name, commit_hash, timestamp, \
         auth_integrity_score, drift_delta, severity, vulnerabilities";

    /// Fetch one scan by id.
    pub fn get_scan(&self, id: i64) -> Result<Option<ScanResult>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM scan_results WHERE id = ?1",
                    Self::SCAN_COLUMNS
                ),
                params![id],
                Self::row_to_scan,
            )
            .optional()
        })
    }

    /// Most recent scans, newest first.
    pub fn recent_scans(&self, limit: usize) -> Result<Vec<ScanResult>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM scan_results ORDER BY timestamp DESC LIMIT ?1",
                Self::SCAN_COLUMNS
            ))?;
            let scans = stmt
                .query_map(params![limit as i64], Self::row_to_scan)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(scans)
        })
    }

    /// High/Critical scans without a processing checkpoint, oldest first.
    pub fn unprocessed_high_severity(&self, limit: usize) -> Result<Vec<ScanResult>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM scan_results sr
                 LEFT JOIN jira_processed_scans jps ON sr.id = jps.scan_result_id
                 WHERE jps.id IS NULL
                   AND sr.severity IN ('High', 'Critical')
                 ORDER BY sr.timestamp ASC
                 LIMIT ?1",
                "sr.id, sr.repo_name, sr.commit_hash, sr.timestamp, \
                 sr.auth_integrity_score, sr.drift_delta, sr.severity, sr.vulnerabilities"
            ))?;
            let scans = stmt
                .query_map(params![limit as i64], Self::row_to_scan)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(scans)
        })
    }

    /// Record the processing checkpoint. INSERT OR IGNORE: a scan id
    /// appears at most once regardless of how often it is marked.
    pub fn mark_scan_processed(&self, scan_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO jira_processed_scans (scan_result_id, processed_at)
                 VALUES (?1, ?2)",
                params![scan_id, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    pub fn is_scan_processed(&self, scan_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM jira_processed_scans WHERE scan_result_id = ?1",
                params![scan_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // ==================== Tracker tickets ====================

    /// Look up the open ticket for a dedup coordinate, if any.
    pub fn find_open_ticket(
        &self,
        repo_name: &str,
        endpoint_or_file: &str,
        vulnerability_type: &str,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT jira_issue_key FROM jira_issues
                 WHERE repo_name = ?1
                   AND endpoint_or_file = ?2
                   AND vulnerability_type = ?3
                   AND jira_status = 'Open'
                 LIMIT 1",
                params![repo_name, endpoint_or_file, vulnerability_type],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Number of open tickets for a dedup coordinate.
    pub fn open_ticket_count(
        &self,
        repo_name: &str,
        endpoint_or_file: &str,
        vulnerability_type: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM jira_issues
                 WHERE repo_name = ?1
                   AND endpoint_or_file = ?2
                   AND vulnerability_type = ?3
                   AND jira_status = 'Open'",
                params![repo_name, endpoint_or_file, vulnerability_type],
                |row| row.get(0),
            )
        })
    }

    /// Persist a ticket row after successful creation on the tracker.
    pub fn save_ticket(&self, ticket: &NewTicket) -> Result<()> {
        self.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO jira_issues
                    (scan_result_id, finding_index, repo_name, vulnerability_type,
                     endpoint_or_file, jira_issue_key, jira_status, severity,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'Open', ?7, ?8, ?8)",
                params![
                    ticket.scan_result_id,
                    ticket.finding_index,
                    ticket.repo_name,
                    ticket.vulnerability_type.as_str(),
                    ticket.endpoint_or_file,
                    ticket.jira_issue_key,
                    ticket.severity.as_str(),
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Ticket rows recorded for one scan, newest first.
    pub fn tickets_for_scan(&self, scan_id: i64) -> Result<Vec<crate::store::types::TicketRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, scan_result_id, finding_index, repo_name, vulnerability_type,
                        endpoint_or_file, jira_issue_key, jira_status, severity,
                        created_at, updated_at
                 FROM jira_issues
                 WHERE scan_result_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let tickets = stmt
                .query_map(params![scan_id], |row| {
                    let severity: String = row.get(8)?;
                    let created: String = row.get(9)?;
                    let updated: String = row.get(10)?;
                    Ok(crate::store::types::TicketRecord {
                        id: row.get(0)?,
                        scan_result_id: row.get(1)?,
                        finding_index: row.get(2)?,
                        repo_name: row.get(3)?,
                        vulnerability_type: row.get(4)?,
                        endpoint_or_file: row.get(5)?,
                        jira_issue_key: row.get(6)?,
                        jira_status: row.get(7)?,
                        severity: Severity::parse(&severity).unwrap_or(Severity::High),
                        created_at: parse_timestamp(&created).map_err(conversion_error)?,
                        updated_at: parse_timestamp(&updated).map_err(conversion_error)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tickets)
        })
    }

    // ==================== Tracker config ====================

    /// Stored tracker configuration, if an operator saved one.
    pub fn load_tracker_config(&self) -> Result<Option<TrackerSettings>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT base_url, project_key, api_token, user_email, issue_type
                 FROM jira_integration_config
                 ORDER BY updated_at DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok(TrackerSettings {
                        base_url: row.get(0)?,
                        project_key: row.get(1)?,
                        api_token: row.get(2)?,
                        user_email: row.get(3)?,
                        issue_type: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Save tracker configuration for later processes.
    pub fn save_tracker_config(&self, settings: &TrackerSettings) -> Result<()> {
        self.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO jira_integration_config
                    (base_url, project_key, api_token, user_email, issue_type,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    settings.base_url,
                    settings.project_key,
                    settings.api_token,
                    settings.user_email,
                    settings.issue_type,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    // ==================== Red-team findings ====================

    /// Insert a batch of findings in a single transaction.
    pub fn insert_findings(&self, findings: &[NewFinding]) -> Result<usize> {
        if findings.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            for finding in findings {
                tx.execute(
                    "INSERT INTO redteam_findings
                        (title, description, severity, status, category, endpoint,
                         method, evidence, recommendation, scan_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        finding.title,
                        finding.description,
                        finding.severity,
                        finding.category,
                        finding.endpoint,
                        finding.method,
                        finding.evidence,
                        finding.recommendation,
                        finding.scan_id,
                        now,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(findings.len())
        })
    }

    fn row_to_finding(row: &Row<'_>) -> rusqlite::Result<Finding> {
        let status: String = row.get(4)?;
        let created: String = row.get(11)?;
        let updated: String = row.get(12)?;
        Ok(Finding {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            severity: row.get(3)?,
            status: FindingStatus::parse(&status).unwrap_or(FindingStatus::Open),
            category: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            endpoint: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            method: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            evidence: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            recommendation: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            scan_id: row.get(10)?,
            created_at: parse_timestamp(&created).map_err(conversion_error)?,
            updated_at: parse_timestamp(&updated).map_err(conversion_error)?,
        })
    }

    /// Most recent findings, newest first.
    pub fn list_findings(&self, limit: usize) -> Result<Vec<Finding>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, severity, status, category, endpoint,
                        method, evidence, recommendation, scan_id, created_at, updated_at
                 FROM redteam_findings
                 ORDER BY created_at DESC
                 LIMIT ?1",
            )?;
            let findings = stmt
                .query_map(params![limit as i64], Self::row_to_finding)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(findings)
        })
    }

    /// Apply the narrow status/detail update surface to one finding.
    /// Returns false when the finding does not exist.
    pub fn update_finding(&self, id: i64, update: &FindingUpdate) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE redteam_findings SET
                    status = COALESCE(?2, status),
                    severity = COALESCE(?3, severity),
                    description = COALESCE(?4, description),
                    evidence = COALESCE(?5, evidence),
                    recommendation = COALESCE(?6, recommendation),
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    update.status.map(|s| s.as_str()),
                    update.severity,
                    update.description,
                    update.evidence,
                    update.recommendation,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(rows > 0)
        })
    }

    // ==================== Derived projections ====================

    /// All persisted vulnerabilities, newest scan first, each annotated
    /// with its scan id, repository, commit, and lowercased scan severity.
    /// This is the duck-typed feed the attack simulator consumes.
    pub fn vulnerability_projection(&self) -> Result<Vec<Value>> {
        let scans = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM scan_results ORDER BY timestamp DESC",
                Self::SCAN_COLUMNS
            ))?;
            let scans = stmt
                .query_map([], Self::row_to_scan)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(scans)
        })?;
        let mut out = Vec::new();
        for scan in scans {
            for vuln in &scan.vulnerabilities {
                let mut value = serde_json::to_value(vuln)?;
                if let Value::Object(map) = &mut value {
                    map.insert("scan_id".to_string(), Value::from(scan.id));
                    map.insert("repo_name".to_string(), Value::from(scan.repo_name.clone()));
                    map.insert(
                        "commit_hash".to_string(),
                        Value::from(scan.commit_hash.clone()),
                    );
                    map.insert(
                        "severity".to_string(),
                        Value::from(scan.severity.as_str().to_lowercase()),
                    );
                }
                out.push(value);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{Provenance, VulnKind};

    fn sample_vuln(kind: VulnKind, confidence: u8) -> Vulnerability {
        Vulnerability {
            function_name: "get_order".to_string(),
            method: "GET".to_string(),
            path: "/api/orders/{id}".to_string(),
            file_path: "app/orders.py".to_string(),
            vulnerability_type: kind,
            confidence,
            reasoning: "no ownership check".to_string(),
            validated_by: Provenance::Consensus,
        }
    }

    fn sample_scan(severity: Severity) -> NewScan {
        NewScan {
            repo_name: "acme/shop".to_string(),
            commit_hash: "abc123".to_string(),
            auth_integrity_score: 25,
            drift_delta: 10,
            severity,
            vulnerabilities: vec![sample_vuln(VulnKind::Bola, 86)],
        }
    }

    #[test]
    fn scan_round_trip() {
        let store = SentinelStore::in_memory().unwrap();
        let id = store.insert_scan(&sample_scan(Severity::Critical)).unwrap();

        let scan = store.get_scan(id).unwrap().unwrap();
        assert_eq!(scan.repo_name, "acme/shop");
        assert_eq!(scan.severity, Severity::Critical);
        assert_eq!(scan.vulnerabilities.len(), 1);
        assert_eq!(scan.vulnerabilities[0].vulnerability_type, VulnKind::Bola);
        assert_eq!(scan.vulnerabilities[0].validated_by, Provenance::Consensus);
    }

    #[test]
    fn unprocessed_scans_are_oldest_first_and_filtered() {
        let store = SentinelStore::in_memory().unwrap();
        let first = store.insert_scan(&sample_scan(Severity::Critical)).unwrap();
        let second = store.insert_scan(&sample_scan(Severity::High)).unwrap();
        let low = store.insert_scan(&sample_scan(Severity::Low)).unwrap();

        let unprocessed = store.unprocessed_high_severity(50).unwrap();
        let ids: Vec<i64> = unprocessed.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(!ids.contains(&low));

        store.mark_scan_processed(first).unwrap();
        let remaining = store.unprocessed_high_severity(50).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second);
    }

    #[test]
    fn checkpoint_is_idempotent() {
        let store = SentinelStore::in_memory().unwrap();
        let id = store.insert_scan(&sample_scan(Severity::High)).unwrap();

        store.mark_scan_processed(id).unwrap();
        store.mark_scan_processed(id).unwrap();
        assert!(store.is_scan_processed(id).unwrap());
        assert!(store.unprocessed_high_severity(50).unwrap().is_empty());
    }

    #[test]
    fn open_ticket_lookup() {
        let store = SentinelStore::in_memory().unwrap();
        assert_eq!(
            store
                .find_open_ticket("acme/shop", "/api/orders/{id}", "BOLA")
                .unwrap(),
            None
        );

        store
            .save_ticket(&NewTicket {
                scan_result_id: 1,
                finding_index: 0,
                repo_name: "acme/shop".to_string(),
                vulnerability_type: VulnKind::Bola,
                endpoint_or_file: "/api/orders/{id}".to_string(),
                jira_issue_key: "SENT-42".to_string(),
                severity: Severity::Critical,
            })
            .unwrap();

        assert_eq!(
            store
                .find_open_ticket("acme/shop", "/api/orders/{id}", "BOLA")
                .unwrap(),
            Some("SENT-42".to_string())
        );
        assert_eq!(
            store
                .open_ticket_count("acme/shop", "/api/orders/{id}", "BOLA")
                .unwrap(),
            1
        );
    }

    #[test]
    fn findings_insert_and_update() {
        let store = SentinelStore::in_memory().unwrap();
        let inserted = store
            .insert_findings(&[NewFinding {
                title: "Exploitable: BOLA".to_string(),
                description: "Attack succeeded".to_string(),
                severity: "high".to_string(),
                category: "IDOR User Enumeration".to_string(),
                endpoint: "/api/orders/{id}".to_string(),
                method: "GET".to_string(),
                evidence: "Simulated attack successful".to_string(),
                recommendation: "Add ownership checks".to_string(),
                scan_id: Some(1),
            }])
            .unwrap();
        assert_eq!(inserted, 1);

        let findings = store.list_findings(10).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status, FindingStatus::Open);

        let updated = store
            .update_finding(
                findings[0].id,
                &FindingUpdate {
                    status: Some(FindingStatus::Confirmed),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated);

        let findings = store.list_findings(10).unwrap();
        assert_eq!(findings[0].status, FindingStatus::Confirmed);
        assert!(!store.update_finding(9999, &FindingUpdate::default()).unwrap());
    }

    #[test]
    fn projection_annotates_scan_context() {
        let store = SentinelStore::in_memory().unwrap();
        store.insert_scan(&sample_scan(Severity::Critical)).unwrap();

        let projection = store.vulnerability_projection().unwrap();
        assert_eq!(projection.len(), 1);
        let row = &projection[0];
        assert_eq!(row["severity"], "critical");
        assert_eq!(row["repo_name"], "acme/shop");
        assert_eq!(row["vulnerability_type"], "BOLA");
        assert_eq!(row["validated_by"], "consensus");
        assert!(row["scan_id"].as_i64().is_some());
    }

    #[test]
    fn tracker_config_round_trip() {
        let store = SentinelStore::in_memory().unwrap();
        assert!(store.load_tracker_config().unwrap().is_none());

        let settings = TrackerSettings {
            base_url: "https://acme.atlassian.net".to_string(),
            user_email: "bot@acme.dev".to_string(),
            api_token: "token".to_string(),
            project_key: "SENT".to_string(),
            issue_type: "Bug".to_string(),
        };
        store.save_tracker_config(&settings).unwrap();

        let loaded = store.load_tracker_config().unwrap().unwrap();
        assert_eq!(loaded.base_url, settings.base_url);
        assert_eq!(loaded.project_key, "SENT");
    }
}
