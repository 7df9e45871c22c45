//! Attack simulator: probabilistic exploits against persisted
//! vulnerabilities, with successful attempts recorded as findings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::store::{NewFinding, SentinelStore};

use super::templates::{categorize, templates_for, AttackTemplate};

/// Pause between simulated attacks.
const PACING: Duration = Duration::from_millis(100);

const DEFAULT_RECOMMENDATION: &str = "Review and implement proper access controls";

/// Restrict a cycle to vulnerabilities a given reviewer participated in.
///
/// The qwen set deliberately excludes `fallback_mistral`: a single-witness
/// verdict only ever has Mistral behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFilter {
    Qwen,
    Mistral,
}

impl ModelFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qwen => "qwen",
            Self::Mistral => "mistral",
        }
    }

    /// Provenance tags that count as this reviewer's participation.
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            Self::Qwen => &["consensus", "judged", "gemini_validated"],
            Self::Mistral => &["fallback_mistral", "consensus", "judged", "gemini_validated"],
        }
    }
}

/// One simulated attack outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackResult {
    pub attack_name: String,
    pub attack_description: String,
    pub target_endpoint: String,
    pub target_method: String,
    pub vulnerability_title: String,
    pub original_severity: String,
    pub attack_successful: bool,
    pub exploitation_difficulty: String,
    pub simulated_at: DateTime<Utc>,
    pub recommendation: String,
    pub model_source: String,
    pub validated_by: String,
    pub confidence: i64,
    pub scan_id: Option<i64>,
}

/// Summary of one red-team cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub model_source: String,
    pub vulnerabilities_analyzed: usize,
    pub recent_scans_found: usize,
    pub total_attacks_simulated: usize,
    pub successful_attacks: usize,
    pub findings_created: usize,
    pub attack_results: Vec<AttackResult>,
    pub high_risk_findings: Vec<AttackResult>,
}

// Vulnerability records arrive duck-typed (dashboard rows, stored JSON),
// so field access goes through fixed-order fallback lists.

fn text_field<'a>(vuln: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| vuln.get(*k).and_then(Value::as_str))
}

fn target_endpoint(vuln: &Value) -> String {
    text_field(vuln, &["endpoint", "route", "path"])
        .unwrap_or("Unknown")
        .to_string()
}

fn vulnerability_title(vuln: &Value) -> String {
    text_field(vuln, &["title", "vulnerability_type", "name"])
        .unwrap_or("Unknown Vulnerability")
        .to_string()
}

fn severity_of(vuln: &Value) -> String {
    text_field(vuln, &["severity"])
        .unwrap_or("medium")
        .to_lowercase()
}

fn success_probability(severity: &str) -> f64 {
    match severity {
        "critical" => 0.85,
        "high" => 0.70,
        "medium" => 0.50,
        "low" => 0.30,
        "info" => 0.10,
        _ => 0.50,
    }
}

fn difficulty(probability: f64) -> &'static str {
    if probability > 0.6 {
        "Easy"
    } else if probability > 0.3 {
        "Medium"
    } else {
        "Hard"
    }
}

/// Simulates attacks against vulnerabilities read from the store.
pub struct AttackSimulator {
    store: Arc<SentinelStore>,
}

impl AttackSimulator {
    pub fn new(store: Arc<SentinelStore>) -> Self {
        Self { store }
    }

    /// Persisted vulnerabilities, optionally restricted to those a given
    /// reviewer participated in.
    pub fn fetch_vulnerabilities(&self, model: Option<ModelFilter>) -> Result<Vec<Value>> {
        let all = self.store.vulnerability_projection()?;
        let Some(filter) = model else {
            return Ok(all);
        };

        let tags = filter.tags();
        let filtered: Vec<Value> = all
            .into_iter()
            .filter(|v| {
                v.get("validated_by")
                    .and_then(Value::as_str)
                    .map(|tag| tags.contains(&tag))
                    .unwrap_or(false)
            })
            .collect();
        Ok(filtered)
    }

    fn generate_attack_result(
        attack: &AttackTemplate,
        vuln: &Value,
        model_source: &str,
    ) -> AttackResult {
        let severity = severity_of(vuln);
        let probability = success_probability(&severity);
        let success = rand::thread_rng().gen::<f64>() < probability;

        AttackResult {
            attack_name: attack.name.to_string(),
            attack_description: attack.description.to_string(),
            target_endpoint: target_endpoint(vuln),
            target_method: text_field(vuln, &["method"]).unwrap_or("GET").to_string(),
            vulnerability_title: vulnerability_title(vuln),
            original_severity: severity,
            attack_successful: success,
            exploitation_difficulty: difficulty(probability).to_string(),
            simulated_at: Utc::now(),
            recommendation: text_field(vuln, &["recommendation"])
                .unwrap_or(DEFAULT_RECOMMENDATION)
                .to_string(),
            model_source: model_source.to_string(),
            validated_by: text_field(vuln, &["validated_by"])
                .unwrap_or("unknown")
                .to_string(),
            confidence: vuln.get("confidence").and_then(Value::as_i64).unwrap_or(0),
            scan_id: vuln.get("scan_id").and_then(Value::as_i64),
        }
    }

    /// Run simulated attacks over the given vulnerabilities.
    pub async fn simulate(&self, vulns: &[Value], model_source: &str) -> Vec<AttackResult> {
        if vulns.is_empty() {
            info!(model = model_source, "no vulnerabilities to attack");
            return Vec::new();
        }

        info!(
            vulnerability_count = vulns.len(),
            model = model_source,
            "starting attack simulation"
        );

        let mut results = Vec::new();
        for vuln in vulns {
            let category = categorize(vuln);
            let templates = templates_for(category);

            // rng handles stay out of await scopes.
            let selected: Vec<AttackTemplate> = {
                let mut rng = rand::thread_rng();
                let count = templates.len().min(rng.gen_range(1..=2));
                templates.choose_multiple(&mut rng, count).copied().collect()
            };

            for attack in selected {
                tokio::time::sleep(PACING).await;
                let result = Self::generate_attack_result(&attack, vuln, model_source);
                info!(
                    attack = %result.attack_name,
                    target = %result.target_endpoint,
                    success = result.attack_successful,
                    model = model_source,
                    "attack simulated"
                );
                results.push(result);
            }
        }

        info!(
            total_attacks = results.len(),
            successful = results.iter().filter(|r| r.attack_successful).count(),
            model = model_source,
            "attack simulation complete"
        );

        results
    }

    /// Full cycle over every persisted vulnerability.
    pub async fn run_full_cycle(&self) -> Result<CycleReport> {
        self.run_cycle(None).await
    }

    /// Cycle restricted to one reviewer's vulnerabilities.
    pub async fn run_model_cycle(&self, model: ModelFilter) -> Result<CycleReport> {
        self.run_cycle(Some(model)).await
    }

    async fn run_cycle(&self, model: Option<ModelFilter>) -> Result<CycleReport> {
        let model_source = model.map(|m| m.as_str()).unwrap_or("combined");
        info!(model = model_source, "starting red team cycle");

        let vulns = self.fetch_vulnerabilities(model)?;
        let recent_scans = self.store.recent_scans(10)?;
        let attack_results = self.simulate(&vulns, model_source).await;

        let findings: Vec<NewFinding> = attack_results
            .iter()
            .filter(|r| r.attack_successful)
            .map(|r| self.finding_for(r, model))
            .collect();
        let findings_created = self.store.insert_findings(&findings)?;

        let successful: Vec<AttackResult> = attack_results
            .iter()
            .filter(|r| r.attack_successful)
            .cloned()
            .collect();
        let high_risk_findings: Vec<AttackResult> = successful
            .iter()
            .filter(|r| matches!(r.original_severity.as_str(), "critical" | "high"))
            .cloned()
            .collect();

        Ok(CycleReport {
            status: "completed".to_string(),
            timestamp: Utc::now(),
            model_source: model_source.to_string(),
            vulnerabilities_analyzed: vulns.len(),
            recent_scans_found: recent_scans.len(),
            total_attacks_simulated: attack_results.len(),
            successful_attacks: successful.len(),
            findings_created,
            attack_results,
            high_risk_findings,
        })
    }

    fn finding_for(&self, result: &AttackResult, model: Option<ModelFilter>) -> NewFinding {
        let (title, description, evidence) = match model {
            Some(m) => {
                let tag = m.as_str().to_uppercase();
                (
                    format!("[{tag}] Exploitable: {}", result.vulnerability_title),
                    format!(
                        "[{tag}] Attack '{}' succeeded against {}",
                        result.attack_name, result.target_endpoint
                    ),
                    format!(
                        "Simulated attack successful. Difficulty: {}. Source model: {}",
                        result.exploitation_difficulty,
                        m.as_str()
                    ),
                )
            }
            None => (
                format!("Exploitable: {}", result.vulnerability_title),
                format!(
                    "Attack '{}' succeeded against {}",
                    result.attack_name, result.target_endpoint
                ),
                format!(
                    "Simulated attack successful. Difficulty: {}. Model: {}",
                    result.exploitation_difficulty, result.model_source
                ),
            ),
        };

        NewFinding {
            title,
            description,
            severity: result.original_severity.clone(),
            category: result.attack_name.clone(),
            endpoint: result.target_endpoint.clone(),
            method: result.target_method.clone(),
            evidence,
            recommendation: result.recommendation.clone(),
            scan_id: result.scan_id,
        }
    }
}
