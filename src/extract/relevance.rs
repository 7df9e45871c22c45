//! Caller-side relevance filter: which extracted items are worth a
//! reviewer call.

use super::types::SourceItem;

/// Tokens that mark a function as auth-adjacent. Matched against
/// lowercased source, so every entry is stored lowercased (including the
/// dependency marker and the HTTP-exception type).
const AUTH_KEYWORDS: &[&str] = &[
    "user",
    "admin",
    "role",
    "permission",
    "auth",
    "token",
    "db.query",
    "session.query",
    ".get(",
    ".filter(",
    "current_user",
    "owner",
    "access",
    "privilege",
    "delete",
    "update",
    "create",
    "write",
    "modify",
    "depends",
    "httpexception",
    "status_code",
];

/// Minimum source lines for a non-endpoint to be considered at all.
const MIN_RELEVANT_LINES: usize = 5;

/// Endpoints are always analysed; plain functions only when they are big
/// enough and touch auth-adjacent vocabulary.
pub fn is_security_relevant(item: &SourceItem) -> bool {
    if item.is_endpoint {
        return true;
    }
    let code = item.code.to_lowercase();
    if code.lines().count() < MIN_RELEVANT_LINES {
        return false;
    }
    AUTH_KEYWORDS.iter().any(|kw| code.contains(kw))
}
