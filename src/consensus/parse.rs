//! Salvage parsing of reviewer output.
//!
//! Models are asked for bare JSON but routinely wrap it in markdown fences
//! or prose. The contract here is lenient on input and strict on output:
//! any failure yields None, never an error.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::types::{Verdict, VulnKind};

fn fence_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^```[a-z]*\n?").expect("valid regex"))
}

fn object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{[^{}]*\}").expect("valid regex"))
}

/// Coerce a JSON confidence value (number or numeric string) to 0..=100.
fn coerce_confidence(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    raw.clamp(0.0, 100.0) as u8
}

/// Extract the first JSON object from a model response and build a verdict.
///
/// Strips markdown fences, scans for the first non-nested `{...}` object,
/// and requires the `has_vulnerability` key to be present. Returns None on
/// any failure.
pub fn parse_verdict(text: &str) -> Option<Verdict> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_open = fence_open_re().replace(trimmed, "");
    let cleaned = without_open
        .strip_suffix("```")
        .unwrap_or(&without_open)
        .to_string();

    let object = object_re().find(&cleaned)?;
    let value: Value = serde_json::from_str(object.as_str()).ok()?;

    let has_vulnerability = match value.get("has_vulnerability") {
        Some(Value::Bool(b)) => *b,
        // Some models answer with "true"/"false" strings.
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => return None,
    };

    let kind = value
        .get("vulnerability_type")
        .and_then(Value::as_str)
        .map(VulnKind::parse)
        .unwrap_or(VulnKind::None);

    let confidence = coerce_confidence(value.get("confidence"));

    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Some(Verdict {
        has_vulnerability,
        kind,
        confidence,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let v = parse_verdict(
            r#"{"has_vulnerability": true, "vulnerability_type": "BOLA", "confidence": 85, "reasoning": "no ownership check"}"#,
        )
        .unwrap();
        assert!(v.has_vulnerability);
        assert_eq!(v.kind, VulnKind::Bola);
        assert_eq!(v.confidence, 85);
        assert_eq!(v.reasoning, "no ownership check");
    }

    #[test]
    fn strips_markdown_fences() {
        let v = parse_verdict(
            "```json\n{\"has_vulnerability\": false, \"vulnerability_type\": \"None\", \"confidence\": 0, \"reasoning\": \"ok\"}\n```",
        )
        .unwrap();
        assert!(!v.has_vulnerability);
        assert_eq!(v.kind, VulnKind::None);
    }

    #[test]
    fn extracts_first_object_from_prose() {
        let text = "Here is my analysis: {\"has_vulnerability\": true, \"vulnerability_type\": \"IDOR\", \"confidence\": 70, \"reasoning\": \"raw id\"} hope that helps";
        let v = parse_verdict(text).unwrap();
        assert_eq!(v.kind, VulnKind::Idor);
        assert_eq!(v.confidence, 70);
    }

    #[test]
    fn coerces_string_and_float_confidence() {
        let v = parse_verdict(
            r#"{"has_vulnerability": true, "vulnerability_type": "BOLA", "confidence": "72", "reasoning": "x"}"#,
        )
        .unwrap();
        assert_eq!(v.confidence, 72);

        let v = parse_verdict(
            r#"{"has_vulnerability": true, "vulnerability_type": "BOLA", "confidence": 88.6, "reasoning": "x"}"#,
        )
        .unwrap();
        assert_eq!(v.confidence, 88);

        let v = parse_verdict(
            r#"{"has_vulnerability": true, "vulnerability_type": "BOLA", "confidence": 250, "reasoning": "x"}"#,
        )
        .unwrap();
        assert_eq!(v.confidence, 100);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_verdict("").is_none());
        assert!(parse_verdict("   ").is_none());
        assert!(parse_verdict("no json here").is_none());
        assert!(parse_verdict("{\"confidence\": 90}").is_none());
        assert!(parse_verdict("{not json}").is_none());
    }

    #[test]
    fn missing_optional_fields_default() {
        let v = parse_verdict(r#"{"has_vulnerability": false}"#).unwrap();
        assert_eq!(v.kind, VulnKind::None);
        assert_eq!(v.confidence, 0);
        assert_eq!(v.reasoning, "");
    }
}
