//! Verdict types shared by the consensus engine and its consumers.

use serde::{Deserialize, Serialize};

/// Vulnerability classification assigned by the reviewers.
///
/// The wire form is the canonical display string ("BOLA", "Privilege
/// Escalation", ...). Unrecognised reviewer strings are preserved in
/// `Other` so their penalty weight and dedup key survive round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VulnKind {
    Bola,
    Idor,
    PrivilegeEscalation,
    MissingRoleGuard,
    MissingAuthentication,
    InconsistentMiddleware,
    None,
    Other(String),
}

impl VulnKind {
    /// Parse a reviewer-supplied kind string, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "bola" => Self::Bola,
            "idor" => Self::Idor,
            "privilege escalation" | "privilegeescalation" | "privilege_escalation" => {
                Self::PrivilegeEscalation
            }
            "missing role guard" | "missing_role_guard" => Self::MissingRoleGuard,
            "missing authentication" | "missing_authentication" => Self::MissingAuthentication,
            "inconsistent middleware" | "inconsistent_middleware" => Self::InconsistentMiddleware,
            "none" | "" => Self::None,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    /// Canonical display string (also the wire/stored form).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bola => "BOLA",
            Self::Idor => "IDOR",
            Self::PrivilegeEscalation => "Privilege Escalation",
            Self::MissingRoleGuard => "Missing Role Guard",
            Self::MissingAuthentication => "Missing Authentication",
            Self::InconsistentMiddleware => "Inconsistent Middleware",
            Self::None => "None",
            Self::Other(name) => name,
        }
    }

    /// Risk-score penalty weight for this kind.
    pub fn penalty(&self) -> u32 {
        match self {
            Self::Bola => 25,
            Self::Idor => 20,
            Self::PrivilegeEscalation => 20,
            Self::MissingAuthentication => 15,
            Self::MissingRoleGuard => 10,
            Self::InconsistentMiddleware => 8,
            Self::None => 0,
            Self::Other(_) => 5,
        }
    }
}

impl std::fmt::Display for VulnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for VulnKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VulnKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// How a verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Both reviewers agreed on kind and flag.
    Consensus,
    /// The cloud validator overrode or confirmed the reviewers.
    GeminiValidated,
    /// Disagreement or split vote resolved by confidence thresholds.
    Judged,
    /// Only one reviewer answered and it was confident enough.
    FallbackMistral,
    /// No vulnerability found.
    Clean,
    /// Neither reviewer produced a usable opinion.
    AllFailed,
    /// Empty source; nothing was submitted.
    Skipped,
}

impl Provenance {
    /// The tags downstream consumers treat as positive verdicts.
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Self::Consensus | Self::GeminiValidated | Self::Judged | Self::FallbackMistral
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consensus => "consensus",
            Self::GeminiValidated => "gemini_validated",
            Self::Judged => "judged",
            Self::FallbackMistral => "fallback_mistral",
            Self::Clean => "clean",
            Self::AllFailed => "all_failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parse the snake_case wire form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "consensus" => Some(Self::Consensus),
            "gemini_validated" => Some(Self::GeminiValidated),
            "judged" => Some(Self::Judged),
            "fallback_mistral" => Some(Self::FallbackMistral),
            "clean" => Some(Self::Clean),
            "all_failed" => Some(Self::AllFailed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed reviewer (or validator) opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub has_vulnerability: bool,
    #[serde(rename = "vulnerability_type")]
    pub kind: VulnKind,
    pub confidence: u8,
    pub reasoning: String,
}

impl Verdict {
    /// The null verdict: nothing found.
    pub fn none() -> Self {
        Self {
            has_vulnerability: false,
            kind: VulnKind::None,
            confidence: 0,
            reasoning: "No issue found".to_string(),
        }
    }
}

/// Final per-item outcome: the merged verdict plus its provenance tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub verdict: Verdict,
    pub provenance: Provenance,
}

impl Review {
    pub fn new(verdict: Verdict, provenance: Provenance) -> Self {
        Self {
            verdict,
            provenance,
        }
    }

    pub fn clean() -> Self {
        Self::new(Verdict::none(), Provenance::Clean)
    }

    pub fn skipped() -> Self {
        Self::new(Verdict::none(), Provenance::Skipped)
    }

    pub fn all_failed() -> Self {
        Self::new(Verdict::none(), Provenance::AllFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_canonical_strings() {
        for (raw, kind) in [
            ("BOLA", VulnKind::Bola),
            ("IDOR", VulnKind::Idor),
            ("Privilege Escalation", VulnKind::PrivilegeEscalation),
            ("Missing Role Guard", VulnKind::MissingRoleGuard),
            ("Missing Authentication", VulnKind::MissingAuthentication),
            ("Inconsistent Middleware", VulnKind::InconsistentMiddleware),
            ("None", VulnKind::None),
        ] {
            assert_eq!(VulnKind::parse(raw), kind);
            assert_eq!(kind.as_str(), raw);
        }
    }

    #[test]
    fn kind_parse_is_case_insensitive() {
        assert_eq!(VulnKind::parse("bola"), VulnKind::Bola);
        assert_eq!(
            VulnKind::parse("privilege_escalation"),
            VulnKind::PrivilegeEscalation
        );
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let kind = VulnKind::parse("SQL Injection");
        assert_eq!(kind, VulnKind::Other("SQL Injection".to_string()));
        assert_eq!(kind.penalty(), 5);
    }

    #[test]
    fn positive_provenance_set() {
        assert!(Provenance::Consensus.is_positive());
        assert!(Provenance::GeminiValidated.is_positive());
        assert!(Provenance::Judged.is_positive());
        assert!(Provenance::FallbackMistral.is_positive());
        assert!(!Provenance::Clean.is_positive());
        assert!(!Provenance::AllFailed.is_positive());
        assert!(!Provenance::Skipped.is_positive());
    }

    #[test]
    fn provenance_wire_form() {
        let json = serde_json::to_string(&Provenance::GeminiValidated).unwrap();
        assert_eq!(json, "\"gemini_validated\"");
        assert_eq!(
            Provenance::parse("fallback_mistral"),
            Some(Provenance::FallbackMistral)
        );
    }
}
