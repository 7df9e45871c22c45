//! Scan-level records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consensus::{Provenance, VulnKind};
use crate::score::Severity;

/// A request to scan one repository state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// `owner/repo` form.
    pub repo_name: String,
    pub branch: String,
    pub commit_hash: String,
    pub diff_url: Option<String>,
}

impl ScanRequest {
    pub fn new(repo_name: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            branch: "main".to_string(),
            commit_hash: "latest".to_string(),
            diff_url: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit_hash = commit.into();
        self
    }

    pub fn with_diff_url(mut self, diff_url: impl Into<String>) -> Self {
        self.diff_url = Some(diff_url.into());
        self
    }
}

/// One confirmed vulnerability as persisted on a scan result.
///
/// The serialised form keeps only these canonical keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub function_name: String,
    pub method: String,
    pub path: String,
    pub file_path: String,
    pub vulnerability_type: VulnKind,
    pub confidence: u8,
    pub reasoning: String,
    pub validated_by: Provenance,
}

impl Vulnerability {
    /// Dedup coordinate used by the dispatcher: path, else file path,
    /// else "unknown".
    pub fn endpoint_or_file(&self) -> &str {
        if !self.path.is_empty() {
            &self.path
        } else if !self.file_path.is_empty() {
            &self.file_path
        } else {
            "unknown"
        }
    }
}

/// One persisted scan. Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub id: i64,
    pub repo_name: String,
    pub commit_hash: String,
    pub timestamp: DateTime<Utc>,
    pub auth_integrity_score: u8,
    pub drift_delta: i64,
    pub severity: Severity,
    pub vulnerabilities: Vec<Vulnerability>,
}

/// What a completed scan reports back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: i64,
    pub score: u8,
    pub severity: Severity,
    pub items_extracted: usize,
    pub items_analyzed: usize,
    pub vulnerabilities_found: usize,
}
