//! SQLite schema and migrations for the sentinel store.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // WAL mode: the store is shared by the scan worker, the dispatcher,
    // and the simulator as separate processes.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    // One row per scan; vulnerabilities stored as a JSON array.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS scan_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            repo_name TEXT NOT NULL,
            commit_hash TEXT NOT NULL,
            timestamp TEXT NOT NULL DEFAULT (datetime('now')),
            auth_integrity_score INTEGER NOT NULL,
            drift_delta INTEGER NOT NULL DEFAULT 0,
            severity TEXT NOT NULL,
            vulnerabilities TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS redteam_findings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            severity TEXT NOT NULL DEFAULT 'medium',
            status TEXT NOT NULL DEFAULT 'open',
            category TEXT,
            endpoint TEXT,
            method TEXT,
            evidence TEXT,
            recommendation TEXT,
            scan_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jira_integration_config (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            base_url TEXT,
            project_key TEXT,
            api_token TEXT,
            user_email TEXT,
            issue_type TEXT DEFAULT 'Bug',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jira_issues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_result_id INTEGER,
            finding_index INTEGER,
            repo_name TEXT,
            vulnerability_type TEXT,
            endpoint_or_file TEXT,
            jira_issue_key TEXT,
            jira_status TEXT NOT NULL DEFAULT 'Open',
            severity TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jira_issues_lookup
         ON jira_issues (repo_name, endpoint_or_file, vulnerability_type, jira_status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jira_issues_scan
         ON jira_issues (scan_result_id, finding_index)",
        [],
    )?;

    // Presence of a row means the dispatcher has consumed the scan.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS jira_processed_scans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scan_result_id INTEGER UNIQUE,
            processed_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scan_results_severity
         ON scan_results (severity, timestamp)",
        [],
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='scan_results'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}
