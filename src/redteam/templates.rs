//! Attack template catalogue and vulnerability categorisation.

use serde_json::Value;

/// One attack template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackTemplate {
    pub name: &'static str,
    pub description: &'static str,
}

/// Template category, chosen by keyword match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackCategory {
    Bola,
    PrivilegeEscalation,
    Authentication,
    Authorization,
    Default,
}

const BOLA_TEMPLATES: &[AttackTemplate] = &[
    AttackTemplate {
        name: "IDOR User Enumeration",
        description: "Attempt to access other users' resources by manipulating IDs",
    },
    AttackTemplate {
        name: "Horizontal Privilege Escalation",
        description: "Access resources belonging to same-level users",
    },
    AttackTemplate {
        name: "Object Reference Manipulation",
        description: "Modify object references to access unauthorized data",
    },
];

const PRIVILEGE_TEMPLATES: &[AttackTemplate] = &[
    AttackTemplate {
        name: "Vertical Privilege Escalation",
        description: "Attempt to elevate to admin/higher role",
    },
    AttackTemplate {
        name: "Role Bypass Attack",
        description: "Bypass role checks to access privileged functions",
    },
    AttackTemplate {
        name: "Token Manipulation",
        description: "Modify JWT/session tokens to gain elevated access",
    },
];

const AUTHENTICATION_TEMPLATES: &[AttackTemplate] = &[
    AttackTemplate {
        name: "Session Fixation",
        description: "Force victim to use attacker-controlled session",
    },
    AttackTemplate {
        name: "Credential Stuffing Simulation",
        description: "Test rate limiting on login endpoints",
    },
    AttackTemplate {
        name: "Token Replay Attack",
        description: "Reuse captured authentication tokens",
    },
];

const AUTHORIZATION_TEMPLATES: &[AttackTemplate] = &[
    AttackTemplate {
        name: "Missing Function Level Access Control",
        description: "Access admin functions without proper authorization",
    },
    AttackTemplate {
        name: "Forced Browsing",
        description: "Access restricted endpoints directly",
    },
    AttackTemplate {
        name: "Parameter Tampering",
        description: "Modify request parameters to bypass authorization",
    },
];

const DEFAULT_TEMPLATES: &[AttackTemplate] = &[
    AttackTemplate {
        name: "Generic Security Probe",
        description: "General security testing of the endpoint",
    },
    AttackTemplate {
        name: "Input Validation Test",
        description: "Test input handling and validation",
    },
];

/// Templates for a category.
pub fn templates_for(category: AttackCategory) -> &'static [AttackTemplate] {
    match category {
        AttackCategory::Bola => BOLA_TEMPLATES,
        AttackCategory::PrivilegeEscalation => PRIVILEGE_TEMPLATES,
        AttackCategory::Authentication => AUTHENTICATION_TEMPLATES,
        AttackCategory::Authorization => AUTHORIZATION_TEMPLATES,
        AttackCategory::Default => DEFAULT_TEMPLATES,
    }
}

/// Categorise a vulnerability record by keyword match over its lowercased
/// JSON text rendering.
pub fn categorize(vuln: &Value) -> AttackCategory {
    let text = vuln.to_string().to_lowercase();

    if ["bola", "idor", "object reference", "insecure direct"]
        .iter()
        .any(|term| text.contains(term))
    {
        AttackCategory::Bola
    } else if ["privilege", "escalation", "role"]
        .iter()
        .any(|term| text.contains(term))
    {
        AttackCategory::PrivilegeEscalation
    } else if ["auth", "login", "session", "token", "jwt"]
        .iter()
        .any(|term| text.contains(term))
    {
        AttackCategory::Authentication
    } else if ["access control", "authorization", "forbidden"]
        .iter()
        .any(|term| text.contains(term))
    {
        AttackCategory::Authorization
    } else {
        AttackCategory::Default
    }
}
