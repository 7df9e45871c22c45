//! Extracted source records.

use serde::{Deserialize, Serialize};

/// Sentinel method value for non-endpoint functions.
pub const FUNCTION_METHOD: &str = "FUNCTION";

/// One extracted endpoint or notable function.
///
/// Endpoints carry the uppercased HTTP method and the literal route path;
/// plain functions carry the `FUNCTION` sentinel and their source-file
/// path instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub function_name: String,
    pub method: String,
    pub path: String,
    pub guards: Vec<String>,
    pub arguments: Vec<String>,
    pub code: String,
    pub file_path: String,
    pub is_endpoint: bool,
}

impl SourceItem {
    /// Caller-side uniqueness key: `METHOD:path` for endpoints,
    /// `FUNCTION:name:file` otherwise.
    pub fn key(&self) -> String {
        if self.is_endpoint {
            format!("{}:{}", self.method, self.path)
        } else {
            format!("{}:{}:{}", FUNCTION_METHOD, self.function_name, self.file_path)
        }
    }
}
