//! Issue tracker client (REST v2) with bounded exponential backoff and
//! process-cached issue-type discovery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::TrackerSettings;
use crate::error::{Error, Result};
use crate::scan::{ScanResult, Vulnerability};
use crate::score::Severity;

/// Attempts per tracker call.
const MAX_RETRIES: u32 = 3;
/// Exponential backoff base: waits of 2s then 4s between attempts.
const RETRY_BACKOFF_BASE: u64 = 2;
/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for ticket creation; the seam the dispatcher is tested through.
#[async_trait]
pub trait TicketSink: Send + Sync {
    async fn create_issue(
        &self,
        title: &str,
        description: &str,
        severity: Severity,
    ) -> Result<String>;

    async fn add_comment(&self, issue_key: &str, body: &str) -> Result<()>;
}

/// Issue type reference: discovered id, or a literal name fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IssueTypeRef {
    Id { id: String },
    Name { name: String },
}

/// Tracker connectivity as reported to operators.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerStatus {
    NotConfigured,
    Connected { user: String },
    Error(String),
}

/// Map a scan severity to the tracker priority name.
fn priority_for(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Highest",
        _ => "High",
    }
}

/// Ticket title: `[Sentinel] <severity> - <kind> - <repo>`.
pub fn build_issue_title(severity: Severity, risk_type: &str, repo_name: &str) -> String {
    format!("[Sentinel] {severity} - {risk_type} - {repo_name}")
}

/// Wiki-markup ticket body with vulnerability and repository context.
pub fn build_issue_description(vuln: &Vulnerability, scan: &ScanResult) -> String {
    let lines = [
        format!("*Vulnerability Type:* {}", vuln.vulnerability_type),
        format!("*Severity Level:* {}", scan.severity),
        format!("*Risk Score:* {}", scan.auth_integrity_score),
        format!("*Affected Endpoint / File:* {}", vuln.endpoint_or_file()),
        String::new(),
        "*Attack Path Explanation:*".to_string(),
        if vuln.reasoning.is_empty() {
            "No details available.".to_string()
        } else {
            vuln.reasoning.clone()
        },
        String::new(),
        format!("*Function:* {}", vuln.function_name),
        format!("*Method:* {}", vuln.method),
        format!("*Confidence:* {}%", vuln.confidence),
        String::new(),
        format!("*Repository:* {}", scan.repo_name),
        format!("*Commit Hash:* {}", scan.commit_hash),
        format!("*Scan ID:* {}", scan.id),
        String::new(),
        "----".to_string(),
        "_Generated automatically by Sentinel Jira Integration_".to_string(),
    ];
    lines.join("\n")
}

/// REST v2 tracker client.
pub struct TrackerClient {
    settings: TrackerSettings,
    http: Client,
    // Process-lifetime cache of the discovered issue type.
    issue_type: RwLock<Option<IssueTypeRef>>,
}

impl TrackerClient {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            http: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            issue_type: RwLock::new(None),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Send with up to three attempts and exponential backoff (2s, 4s).
    async fn request_with_retry<F>(&self, mut build: F) -> Result<Value>
    where
        F: FnMut(&Client) -> reqwest::RequestBuilder,
    {
        let mut last_error = Error::tracker("no attempts made");
        for attempt in 1..=MAX_RETRIES {
            let request = build(&self.http)
                .basic_auth(&self.settings.user_email, Some(&self.settings.api_token))
                .header("Accept", "application/json");

            let outcome = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if status.is_success() {
                        if body.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return serde_json::from_str(&body)
                            .map_err(|e| Error::tracker(format!("bad response body: {e}")));
                    }
                    error!(status = status.as_u16(), %body, "tracker API error response");
                    Err(Error::tracker_status(status.as_u16(), body))
                }
                Err(e) => Err(Error::tracker(format!("request failed: {e}"))),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e;
                    if attempt < MAX_RETRIES {
                        let wait = RETRY_BACKOFF_BASE.pow(attempt);
                        warn!(
                            attempt,
                            max = MAX_RETRIES,
                            wait_secs = wait,
                            error = %last_error,
                            "tracker call failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                }
            }
        }
        error!(error = %last_error, "tracker call failed after {MAX_RETRIES} attempts");
        Err(last_error)
    }

    /// Discover a usable issue type for the project, once per process.
    ///
    /// Preference order: the configured name (case-insensitive), the first
    /// non-subtask type, the first type; the literal name `Task` when
    /// discovery fails entirely.
    async fn issue_type(&self) -> IssueTypeRef {
        if let Some(cached) = self.issue_type.read().await.clone() {
            return cached;
        }

        let resolved = self.discover_issue_type().await;
        let mut cache = self.issue_type.write().await;
        *cache = Some(resolved.clone());
        resolved
    }

    async fn discover_issue_type(&self) -> IssueTypeRef {
        let url = self.api_url(&format!("/rest/api/2/project/{}", self.settings.project_key));
        let project = match self.request_with_retry(|http| http.get(&url)).await {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "issue type discovery failed, falling back to 'Task'");
                return IssueTypeRef::Name {
                    name: "Task".to_string(),
                };
            }
        };

        let issue_types = project
            .get("issueTypes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if issue_types.is_empty() {
            warn!("project reported no issue types, falling back to 'Task'");
            return IssueTypeRef::Name {
                name: "Task".to_string(),
            };
        }

        let type_name = |t: &Value| t.get("name").and_then(Value::as_str).unwrap_or("").to_string();
        let type_id = |t: &Value| t.get("id").and_then(Value::as_str).map(str::to_string);

        let configured = self.settings.issue_type.to_lowercase();
        let chosen = issue_types
            .iter()
            .find(|t| type_name(t).to_lowercase() == configured)
            .or_else(|| {
                issue_types
                    .iter()
                    .find(|t| !t.get("subtask").and_then(Value::as_bool).unwrap_or(false))
            })
            .or_else(|| issue_types.first());

        match chosen.and_then(type_id) {
            Some(id) => {
                info!(issue_type_id = %id, "issue type resolved");
                IssueTypeRef::Id { id }
            }
            None => IssueTypeRef::Name {
                name: "Task".to_string(),
            },
        }
    }

    /// Verify credentials against the tracker.
    pub async fn connectivity(&self) -> TrackerStatus {
        if !self.settings.is_configured() {
            return TrackerStatus::NotConfigured;
        }
        let url = self.api_url("/rest/api/2/myself");
        match self.request_with_retry(|http| http.get(&url)).await {
            Ok(user) => TrackerStatus::Connected {
                user: user
                    .get("displayName")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string(),
            },
            Err(e) => TrackerStatus::Error(e.to_string()),
        }
    }
}

#[async_trait]
impl TicketSink for TrackerClient {
    async fn create_issue(
        &self,
        title: &str,
        description: &str,
        severity: Severity,
    ) -> Result<String> {
        let issue_type = self.issue_type().await;
        let payload = json!({
            "fields": {
                "project": { "key": self.settings.project_key },
                "summary": title,
                "description": description,
                "issuetype": issue_type,
                "priority": { "name": priority_for(severity) },
            }
        });

        info!(%title, "creating tracker issue");
        let url = self.api_url("/rest/api/2/issue");
        let response = self
            .request_with_retry(|http| http.post(&url).json(&payload))
            .await?;

        let key = response
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();
        info!(issue_key = %key, "tracker issue created");
        Ok(key)
    }

    async fn add_comment(&self, issue_key: &str, body: &str) -> Result<()> {
        let url = self.api_url(&format!("/rest/api/2/issue/{issue_key}/comment"));
        let payload = json!({ "body": body });
        self.request_with_retry(|http| http.post(&url).json(&payload))
            .await?;
        info!(%issue_key, "recurrence comment added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{Provenance, VulnKind};
    use chrono::Utc;

    fn sample_scan() -> ScanResult {
        ScanResult {
            id: 9,
            repo_name: "acme/shop".to_string(),
            commit_hash: "abc123".to_string(),
            timestamp: Utc::now(),
            auth_integrity_score: 22,
            drift_delta: 14,
            severity: Severity::Critical,
            vulnerabilities: vec![],
        }
    }

    fn sample_vuln() -> Vulnerability {
        Vulnerability {
            function_name: "get_order".to_string(),
            method: "GET".to_string(),
            path: "/api/orders/{id}".to_string(),
            file_path: "app/orders.py".to_string(),
            vulnerability_type: VulnKind::Bola,
            confidence: 86,
            reasoning: "object fetched by raw id".to_string(),
            validated_by: Provenance::Consensus,
        }
    }

    #[test]
    fn title_format() {
        assert_eq!(
            build_issue_title(Severity::Critical, "BOLA", "acme/shop"),
            "[Sentinel] Critical - BOLA - acme/shop"
        );
    }

    #[test]
    fn description_carries_context_and_marker() {
        let description = build_issue_description(&sample_vuln(), &sample_scan());
        assert!(description.contains("*Vulnerability Type:* BOLA"));
        assert!(description.contains("*Affected Endpoint / File:* /api/orders/{id}"));
        assert!(description.contains("*Confidence:* 86%"));
        assert!(description.contains("*Repository:* acme/shop"));
        assert!(description.contains("*Scan ID:* 9"));
        assert!(description.contains("_Generated automatically by Sentinel Jira Integration_"));
    }

    #[test]
    fn priority_mapping() {
        assert_eq!(priority_for(Severity::Critical), "Highest");
        assert_eq!(priority_for(Severity::High), "High");
        assert_eq!(priority_for(Severity::Medium), "High");
        assert_eq!(priority_for(Severity::Low), "High");
    }

    #[test]
    fn issue_type_ref_wire_shapes() {
        let id = serde_json::to_value(IssueTypeRef::Id {
            id: "10001".to_string(),
        })
        .unwrap();
        assert_eq!(id, json!({"id": "10001"}));

        let name = serde_json::to_value(IssueTypeRef::Name {
            name: "Task".to_string(),
        })
        .unwrap();
        assert_eq!(name, json!({"name": "Task"}));
    }
}
