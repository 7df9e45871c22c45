//! Webhook signature verification and event filtering.
//!
//! Signatures are HMAC-SHA256 over the raw body, delivered as
//! `X-Hub-Signature-256: sha256=<hex>` and compared in constant time. A
//! mismatch is rejected unless the explicit dev-mode `allow_unverified`
//! knob is set, in which case it is logged and processing continues.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::warn;

use crate::config::WebhookSettings;
use crate::scan::ScanRequest;

type HmacSha256 = Hmac<Sha256>;

/// Pull-request actions that trigger a scan.
const SCAN_ACTIONS: &[&str] = &["opened", "synchronize", "reopened"];

/// Outcome of evaluating one webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookDecision {
    /// A qualifying pull-request event; enqueue this scan.
    Scan {
        request: ScanRequest,
        pr_number: u64,
    },
    /// Verified but not a scan-triggering event.
    Ignored,
    /// Signature did not verify.
    Rejected,
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Verify the HMAC-SHA256 signature of a raw webhook body.
pub fn verify_signature(secret: &str, body: &[u8], signature_header: Option<&str>) -> bool {
    let Some(header) = signature_header else {
        return false;
    };
    let Some(hex) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Some(expected) = decode_hex(hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Evaluate one delivery: verify the signature, then filter for
/// pull-request events with a qualifying action.
pub fn evaluate(
    settings: &WebhookSettings,
    body: &[u8],
    signature_header: Option<&str>,
) -> WebhookDecision {
    if !verify_signature(&settings.secret, body, signature_header) {
        if settings.allow_unverified {
            warn!("webhook signature invalid, continuing (allow_unverified is set)");
        } else {
            return WebhookDecision::Rejected;
        }
    }

    let Ok(payload) = serde_json::from_slice::<Value>(body) else {
        return WebhookDecision::Ignored;
    };

    let action = payload.get("action").and_then(Value::as_str).unwrap_or("");
    let Some(pr) = payload.get("pull_request") else {
        return WebhookDecision::Ignored;
    };
    if !SCAN_ACTIONS.contains(&action) {
        return WebhookDecision::Ignored;
    }

    let repo_name = payload
        .pointer("/repository/full_name")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    if repo_name.is_empty() {
        return WebhookDecision::Ignored;
    }

    let branch = pr
        .pointer("/head/ref")
        .and_then(Value::as_str)
        .unwrap_or("main");
    let commit = pr
        .pointer("/head/sha")
        .and_then(Value::as_str)
        .unwrap_or("latest");
    let pr_number = pr.get("number").and_then(Value::as_u64).unwrap_or(0);

    let mut request = ScanRequest::new(repo_name)
        .with_branch(branch)
        .with_commit(commit);
    if let Some(diff_url) = pr.get("diff_url").and_then(Value::as_str) {
        request = request.with_diff_url(diff_url);
    }

    WebhookDecision::Scan { request, pr_number }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "super-secret";

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let digest = mac.finalize().into_bytes();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("sha256={hex}")
    }

    fn settings(allow_unverified: bool) -> WebhookSettings {
        WebhookSettings {
            secret: SECRET.to_string(),
            allow_unverified,
        }
    }

    fn pr_payload(action: &str) -> Vec<u8> {
        json!({
            "action": action,
            "pull_request": {
                "number": 42,
                "diff_url": "https://github.com/acme/shop/pull/42.diff",
                "head": { "sha": "abc123", "ref": "feature/orders" }
            },
            "repository": { "full_name": "acme/shop" }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn valid_signature_verifies() {
        let body = pr_payload("opened");
        let header = sign(SECRET, &body);
        assert!(verify_signature(SECRET, &body, Some(&header)));
    }

    #[test]
    fn bad_signatures_fail() {
        let body = pr_payload("opened");
        assert!(!verify_signature(SECRET, &body, None));
        assert!(!verify_signature(SECRET, &body, Some("sha256=deadbeef")));
        assert!(!verify_signature(SECRET, &body, Some("md5=abc")));
        let other = sign("wrong-secret", &body);
        assert!(!verify_signature(SECRET, &body, Some(&other)));
    }

    #[test]
    fn qualifying_pull_request_enqueues_a_scan() {
        let body = pr_payload("synchronize");
        let header = sign(SECRET, &body);
        let decision = evaluate(&settings(false), &body, Some(&header));

        match decision {
            WebhookDecision::Scan { request, pr_number } => {
                assert_eq!(request.repo_name, "acme/shop");
                assert_eq!(request.branch, "feature/orders");
                assert_eq!(request.commit_hash, "abc123");
                assert_eq!(
                    request.diff_url.as_deref(),
                    Some("https://github.com/acme/shop/pull/42.diff")
                );
                assert_eq!(pr_number, 42);
            }
            other => panic!("expected a scan decision, got {other:?}"),
        }
    }

    #[test]
    fn non_scan_actions_are_ignored() {
        let body = pr_payload("closed");
        let header = sign(SECRET, &body);
        assert_eq!(
            evaluate(&settings(false), &body, Some(&header)),
            WebhookDecision::Ignored
        );
    }

    #[test]
    fn non_pull_request_events_are_ignored() {
        let body = json!({"action": "opened", "issue": {"number": 7}})
            .to_string()
            .into_bytes();
        let header = sign(SECRET, &body);
        assert_eq!(
            evaluate(&settings(false), &body, Some(&header)),
            WebhookDecision::Ignored
        );
    }

    #[test]
    fn invalid_signature_rejects_unless_dev_mode() {
        let body = pr_payload("opened");
        assert_eq!(
            evaluate(&settings(false), &body, Some("sha256=00")),
            WebhookDecision::Rejected
        );

        // Dev-mode knob: logged and processed anyway.
        match evaluate(&settings(true), &body, Some("sha256=00")) {
            WebhookDecision::Scan { pr_number, .. } => assert_eq!(pr_number, 42),
            other => panic!("expected a scan decision, got {other:?}"),
        }
    }
}
