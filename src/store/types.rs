//! Stored record types for findings and tracker tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consensus::VulnKind;
use crate::score::Severity;

/// Lifecycle of a red-team finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    Confirmed,
    Fixed,
    FalsePositive,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Confirmed => "confirmed",
            Self::Fixed => "fixed",
            Self::FalsePositive => "false_positive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(Self::Open),
            "confirmed" => Some(Self::Confirmed),
            "fixed" => Some(Self::Fixed),
            "false_positive" => Some(Self::FalsePositive),
            _ => None,
        }
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted exploit outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Lowercase exploit severity (critical/high/medium/low/info).
    pub severity: String,
    pub status: FindingStatus,
    pub category: String,
    pub endpoint: String,
    pub method: String,
    pub evidence: String,
    pub recommendation: String,
    pub scan_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input shape for a new finding row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFinding {
    pub title: String,
    pub description: String,
    pub severity: String,
    pub category: String,
    pub endpoint: String,
    pub method: String,
    pub evidence: String,
    pub recommendation: String,
    pub scan_id: Option<i64>,
}

/// Narrow update surface for finding status and details.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingUpdate {
    pub status: Option<FindingStatus>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub evidence: Option<String>,
    pub recommendation: Option<String>,
}

/// One tracker ticket row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: i64,
    pub scan_result_id: i64,
    pub finding_index: i64,
    pub repo_name: String,
    pub vulnerability_type: String,
    pub endpoint_or_file: String,
    pub jira_issue_key: String,
    pub jira_status: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input shape for a new ticket row; status defaults to `Open`.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub scan_result_id: i64,
    pub finding_index: i64,
    pub repo_name: String,
    pub vulnerability_type: VulnKind,
    pub endpoint_or_file: String,
    pub jira_issue_key: String,
    pub severity: Severity,
}

/// Input shape for a new scan row.
#[derive(Debug, Clone)]
pub struct NewScan {
    pub repo_name: String,
    pub commit_hash: String,
    pub auth_integrity_score: u8,
    pub drift_delta: i64,
    pub severity: Severity,
    pub vulnerabilities: Vec<crate::scan::Vulnerability>,
}
