//! Consensus engine: merges the reviewers' opinions (and optionally the
//! validator's) into one verdict with a provenance tag.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::extract::SourceItem;
use crate::llm::ReviewerGateway;

use super::parse::parse_verdict;
use super::types::{Provenance, Review, Verdict};

const DETECTION_PROMPT: &str = r#"Security analysis task. Analyze this Python function for authorization vulnerabilities.

Vulnerability types (pick ONE that fits best, or None):
- BOLA: accesses DB object by user-supplied ID without ownership check
- IDOR: user-supplied param references object without auth check
- Privilege Escalation: changes role/permission from user input without admin check
- Missing Role Guard: HTTP endpoint with no dependency/role check, exposes sensitive data
- Missing Authentication: no identity verification before data access
- None: code is secure

Function: {function_name} | Method: {method} | Path: {path}
Guards: {guards} | Args: {arguments}

CODE:
{code}

Reply ONLY with this JSON (no markdown, one short sentence for reasoning):
{"has_vulnerability": true, "vulnerability_type": "BOLA", "confidence": 85, "reasoning": "sentence"}
"#;

const VALIDATION_PROMPT: &str = r#"You are a security validation engine. Analyze findings from two AI models.
Produce a final verdict. Be conservative and only confirm with solid evidence.

CODE:
{code}

MISTRAL: {mistral_result}
QWEN: {qwen_result}

Output ONLY this JSON (no markdown):
{"has_vulnerability": true, "vulnerability_type": "string", "confidence": 0, "reasoning": "sentence"}
"#;

/// Single-witness verdicts need this much confidence to be flagged.
const SINGLE_WITNESS_THRESHOLD: u8 = 70;
/// Agreement bonus applied to the mean confidence when both reviewers agree.
const AGREEMENT_BONUS: f64 = 1.15;
/// Penalty applied to the best confidence when the reviewers disagree on kind.
const DISAGREEMENT_PENALTY: f64 = 0.85;
/// Penalised disagreement verdicts need this much confidence to survive.
const DISAGREEMENT_THRESHOLD: u8 = 60;
/// Split votes (one flags, one clean) need this much confidence.
const SPLIT_VOTE_THRESHOLD: u8 = 75;
/// Validator verdicts below this confidence are ignored.
const VALIDATOR_THRESHOLD: u8 = 50;

fn detection_prompt(item: &SourceItem) -> String {
    DETECTION_PROMPT
        .replace("{function_name}", &item.function_name)
        .replace("{method}", &item.method)
        .replace("{path}", &item.path)
        .replace("{guards}", &format!("{:?}", item.guards))
        .replace("{arguments}", &format!("{:?}", item.arguments))
        .replace("{code}", &item.code)
}

fn validation_prompt(code: &str, a: Option<&Verdict>, b: Option<&Verdict>) -> String {
    let render = |v: Option<&Verdict>| match v {
        Some(v) => serde_json::to_string(v).unwrap_or_else(|_| "unavailable".to_string()),
        None => "unavailable".to_string(),
    };
    VALIDATION_PROMPT
        .replace("{code}", code)
        .replace("{mistral_result}", &render(a))
        .replace("{qwen_result}", &render(b))
}

/// Merge the two reviewers' opinions and the optional validator verdict.
///
/// This is a pure decision table over presence, flags, and kinds; callers
/// handle the empty-source case before invoking it.
pub fn decide(
    reviewer_a: Option<Verdict>,
    reviewer_b: Option<Verdict>,
    validator: Option<Verdict>,
) -> Review {
    // Validator wins outright when it answered with conviction, whichever
    // way it ruled.
    if let Some(v) = validator {
        if v.confidence > VALIDATOR_THRESHOLD {
            return Review::new(v, Provenance::GeminiValidated);
        }
    }

    match (reviewer_a, reviewer_b) {
        (None, None) => Review::all_failed(),

        // Single witness: flag only on high confidence.
        (Some(v), None) | (None, Some(v)) => {
            if v.has_vulnerability && v.confidence > SINGLE_WITNESS_THRESHOLD {
                Review::new(v, Provenance::FallbackMistral)
            } else {
                Review::clean()
            }
        }

        (Some(a), Some(b)) => match (a.has_vulnerability, b.has_vulnerability) {
            (true, true) if a.kind == b.kind => {
                let mean = (a.confidence as f64 + b.confidence as f64) / 2.0;
                let confidence = ((mean * AGREEMENT_BONUS).floor() as u32).min(100) as u8;
                let best = if a.confidence >= b.confidence { &a } else { &b };
                let verdict = Verdict {
                    has_vulnerability: true,
                    kind: a.kind.clone(),
                    confidence,
                    reasoning: format!("[Consensus] {}", best.reasoning),
                };
                Review::new(verdict, Provenance::Consensus)
            }

            (false, false) => Review::clean(),

            (true, true) => {
                let best = if a.confidence >= b.confidence { a } else { b };
                let confidence = (best.confidence as f64 * DISAGREEMENT_PENALTY).floor() as u8;
                if confidence > DISAGREEMENT_THRESHOLD {
                    let verdict = Verdict {
                        has_vulnerability: true,
                        kind: best.kind,
                        confidence,
                        reasoning: format!(
                            "[Disagreement: models differ on type] {}",
                            best.reasoning
                        ),
                    };
                    Review::new(verdict, Provenance::Judged)
                } else {
                    Review::clean()
                }
            }

            // Split vote: exactly one flags.
            _ => {
                let flagging = if a.has_vulnerability { a } else { b };
                if flagging.confidence > SPLIT_VOTE_THRESHOLD {
                    let verdict = Verdict {
                        has_vulnerability: true,
                        kind: flagging.kind,
                        confidence: flagging.confidence,
                        reasoning: format!(
                            "[Split vote — high confidence] {}",
                            flagging.reasoning
                        ),
                    };
                    Review::new(verdict, Provenance::Judged)
                } else {
                    Review::clean()
                }
            }
        },
    }
}

/// Drives the reviewer ensemble for one extracted item.
pub struct ConsensusEngine {
    gateway: Arc<ReviewerGateway>,
}

impl ConsensusEngine {
    pub fn new(gateway: Arc<ReviewerGateway>) -> Self {
        Self { gateway }
    }

    /// One backend call, one parse attempt. Any failure is demoted to "no
    /// opinion" here; the underlying error is only logged.
    async fn opinion_of(
        backend: &Arc<dyn crate::llm::CompletionBackend>,
        prompt: &str,
    ) -> Option<Verdict> {
        match backend.complete(prompt).await {
            Ok(text) => {
                let parsed = parse_verdict(&text);
                if parsed.is_none() {
                    warn!(
                        backend = backend.name(),
                        "unparseable reviewer response: {:.100}", text
                    );
                }
                parsed
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "reviewer call failed, skipping");
                None
            }
        }
    }

    /// Analyze one item: both reviewers concurrently, then the validator
    /// when it is available and at least one reviewer had an opinion.
    pub async fn analyze(&self, item: &SourceItem) -> Review {
        if item.code.trim().is_empty() {
            return Review::skipped();
        }

        let prompt = detection_prompt(item);
        let (a, b) = futures::join!(
            Self::opinion_of(self.gateway.primary(), &prompt),
            Self::opinion_of(self.gateway.secondary(), &prompt),
        );

        let mut validator_verdict = None;
        if (a.is_some() || b.is_some()) && self.gateway.validator_available().await {
            let vp = validation_prompt(&item.code, a.as_ref(), b.as_ref());
            match self.gateway.validate(&vp).await {
                Ok(text) => {
                    validator_verdict = parse_verdict(&text);
                    if let Some(ref v) = validator_verdict {
                        debug!(kind = %v.kind, confidence = v.confidence, "validator verdict");
                    }
                }
                Err(e) => warn!(error = %e, "validator call failed"),
            }
        }

        let review = decide(a, b, validator_verdict);
        debug!(
            item = %item.key(),
            provenance = %review.provenance,
            kind = %review.verdict.kind,
            confidence = review.verdict.confidence,
            "review complete"
        );
        review
    }
}
