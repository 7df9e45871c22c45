//! Severity filter: which persisted vulnerabilities qualify for a ticket.

use tracing::debug;

use crate::consensus::VulnKind;
use crate::scan::Vulnerability;
use crate::score::Severity;

/// Minimum confidence for ticket creation.
const CONFIDENCE_THRESHOLD: u8 = 55;

fn is_named_kind(kind: &VulnKind) -> bool {
    matches!(
        kind,
        VulnKind::Bola
            | VulnKind::Idor
            | VulnKind::MissingAuthentication
            | VulnKind::PrivilegeEscalation
            | VulnKind::MissingRoleGuard
            | VulnKind::InconsistentMiddleware
    )
}

/// A vulnerability qualifies when the scan is High/Critical, the
/// confidence clears the threshold, and the kind is in the named set (or
/// the scan itself is Critical).
pub fn is_qualifying(vuln: &Vulnerability, scan_severity: Severity) -> bool {
    if !matches!(scan_severity, Severity::High | Severity::Critical) {
        return false;
    }
    if vuln.confidence < CONFIDENCE_THRESHOLD {
        return false;
    }
    if is_named_kind(&vuln.vulnerability_type) {
        return true;
    }
    scan_severity == Severity::Critical
}

/// Qualifying vulnerabilities with their original indexes, in order.
pub fn qualifying_vulnerabilities(
    vulnerabilities: &[Vulnerability],
    scan_severity: Severity,
) -> Vec<(usize, &Vulnerability)> {
    let qualifying: Vec<(usize, &Vulnerability)> = vulnerabilities
        .iter()
        .enumerate()
        .filter(|(_, v)| is_qualifying(v, scan_severity))
        .collect();
    debug!(
        qualifying = qualifying.len(),
        total = vulnerabilities.len(),
        severity = %scan_severity,
        "severity filter applied"
    );
    qualifying
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::Provenance;

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
    fn low_and_medium_scans_never_qualify() {
        let v = vuln(VulnKind::Bola, 99);
        assert!(!is_qualifying(&v, Severity::Low));
        assert!(!is_qualifying(&v, Severity::Medium));
    }

    #[test]
    fn confidence_threshold_is_inclusive() {
        assert!(is_qualifying(&vuln(VulnKind::Bola, 55), Severity::High));
        assert!(!is_qualifying(&vuln(VulnKind::Bola, 54), Severity::High));
    }

    #[test]
    fn named_kinds_qualify_on_high() {
        for kind in [
            VulnKind::Bola,
            VulnKind::Idor,
            VulnKind::MissingAuthentication,
            VulnKind::PrivilegeEscalation,
            VulnKind::MissingRoleGuard,
            VulnKind::InconsistentMiddleware,
        ] {
            assert!(is_qualifying(&vuln(kind, 80), Severity::High));
        }
    }

    #[test]
    fn unknown_kinds_need_a_critical_scan() {
        let v = vuln(VulnKind::Other("SSRF".to_string()), 80);
        assert!(!is_qualifying(&v, Severity::High));
        assert!(is_qualifying(&v, Severity::Critical));
    }

    #[test]
    fn indexes_are_preserved_in_order() {
        let vulns = vec![
            vuln(VulnKind::Bola, 90),
            vuln(VulnKind::Bola, 10),
            vuln(VulnKind::Idor, 70),
        ];
        let qualifying = qualifying_vulnerabilities(&vulns, Severity::High);
        let indexes: Vec<usize> = qualifying.iter().map(|(i, _)| *i).collect();
        assert_eq!(indexes, vec![0, 2]);
    }
}
