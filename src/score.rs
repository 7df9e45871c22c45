//! Risk scoring: maps a vulnerability list to a numeric integrity score
//! and a severity band. Pure: same input, same output.

use serde::{Deserialize, Serialize};

use crate::scan::Vulnerability;

/// Severity band derived from the integrity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Band for a 0..=100 integrity score. Lower scores are worse.
    pub fn band(score: u8) -> Self {
        match score {
            0..=30 => Self::Critical,
            31..=60 => Self::High,
            61..=80 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            "Critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score plus its derived band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub severity: Severity,
}

/// Compute the integrity score for a confirmed vulnerability list.
///
/// Each finding subtracts `penalty(kind) * confidence / 100` (integer
/// truncation per item) from a base of 100; the result is clamped to
/// 0..=100 and banded.
pub fn calculate_score(vulnerabilities: &[Vulnerability]) -> RiskAssessment {
    let mut score: i64 = 100;
    for vuln in vulnerabilities {
        let penalty = vuln.vulnerability_type.penalty() as i64;
        score -= penalty * vuln.confidence as i64 / 100;
    }
    let score = score.clamp(0, 100) as u8;
    RiskAssessment {
        score,
        severity: Severity::band(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{Provenance, VulnKind};
    use proptest::prelude::*;

    fn vuln(kind: VulnKind, confidence: u8) -> Vulnerability {
        Vulnerability {
            function_name: "f".to_string(),
            method: "GET".to_string(),
            path: "/x".to_string(),
            file_path: "a.py".to_string(),
            vulnerability_type: kind,
            confidence,
            reasoning: String::new(),
            validated_by: Provenance::Consensus,
        }
    }

    #[test]
    fn empty_list_is_perfect() {
        let assessment = calculate_score(&[]);
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.severity, Severity::Low);
    }

    #[test]
    fn single_bola_at_86_scores_79_medium() {
        let assessment = calculate_score(&[vuln(VulnKind::Bola, 86)]);
        assert_eq!(assessment.score, 79);
        assert_eq!(assessment.severity, Severity::Medium);
    }

    #[test]
    fn bands_match_thresholds() {
        assert_eq!(Severity::band(0), Severity::Critical);
        assert_eq!(Severity::band(30), Severity::Critical);
        assert_eq!(Severity::band(31), Severity::High);
        assert_eq!(Severity::band(60), Severity::High);
        assert_eq!(Severity::band(61), Severity::Medium);
        assert_eq!(Severity::band(80), Severity::Medium);
        assert_eq!(Severity::band(81), Severity::Low);
        assert_eq!(Severity::band(100), Severity::Low);
    }

    #[test]
    fn many_findings_clamp_at_zero() {
        let vulns: Vec<_> = (0..10).map(|_| vuln(VulnKind::Bola, 100)).collect();
        let assessment = calculate_score(&vulns);
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.severity, Severity::Critical);
    }

    fn arb_kind() -> impl Strategy<Value = VulnKind> {
        prop_oneof![
            Just(VulnKind::Bola),
            Just(VulnKind::Idor),
            Just(VulnKind::PrivilegeEscalation),
            Just(VulnKind::MissingRoleGuard),
            Just(VulnKind::MissingAuthentication),
            Just(VulnKind::InconsistentMiddleware),
            Just(VulnKind::Other("X".to_string())),
        ]
    }

    proptest! {
        #[test]
        fn score_is_pure_and_bounded(entries in proptest::collection::vec((arb_kind(), 0u8..=100), 0..20)) {
            let vulns: Vec<_> = entries.iter().map(|(k, c)| vuln(k.clone(), *c)).collect();
            let first = calculate_score(&vulns);
            let second = calculate_score(&vulns);
            prop_assert_eq!(first, second);
            prop_assert!(first.score <= 100);
            prop_assert_eq!(first.severity, Severity::band(first.score));
        }
    }
}
