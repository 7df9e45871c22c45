//! Repository walk: apply the skip policy, parse each Python file, and
//! merge the per-file streams under caller-side key uniqueness.

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use super::parser::extract_file;
use super::types::SourceItem;

/// Directory components that are never scanned.
const SKIP_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    "venv",
    "env",
    ".venv",
    "node_modules",
    "migrations",
    "tests",
    "test",
];

/// File names that are never scanned.
const SKIP_FILES: &[&str] = &["setup.py", "conftest.py"];

fn skip_path(rel: &Path) -> bool {
    let in_skipped_dir = rel
        .components()
        .any(|c| SKIP_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()));
    if in_skipped_dir {
        return true;
    }
    rel.file_name()
        .map(|n| SKIP_FILES.contains(&n.to_string_lossy().as_ref()))
        .unwrap_or(false)
}

/// Walk an unpacked repository and collect every unique endpoint and
/// function record.
///
/// Per-file parse errors are logged and absorbed; they never fail the
/// walk. Results follow walk order, endpoints before functions within a
/// file.
pub fn collect_items(root: &Path, marker: &str) -> Vec<SourceItem> {
    let mut items = Vec::new();
    let mut keys: HashSet<String> = HashSet::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().map(|e| e != "py").unwrap_or(true) {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        if skip_path(rel) {
            continue;
        }

        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(file = %rel.display(), error = %e, "failed to read file, skipping");
                continue;
            }
        };
        if source.trim().is_empty() {
            continue;
        }

        let rel_str = rel.to_string_lossy().replace('\\', "/");
        let extracted = match extract_file(&source, &rel_str, marker) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(file = %rel_str, error = %e, "parse error, skipping file");
                continue;
            }
        };

        for item in extracted
            .endpoints
            .into_iter()
            .chain(extracted.functions.into_iter())
        {
            if keys.insert(item.key()) {
                items.push(item);
            }
        }
    }

    items
}
