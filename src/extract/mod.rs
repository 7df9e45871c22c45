//! Structural extractor: turns repository source into endpoint and
//! function records ready for review.

mod parser;
mod relevance;
mod types;
mod walk;

pub use parser::{extract_file, FileItems};
pub use relevance::is_security_relevant;
pub use types::{SourceItem, FUNCTION_METHOD};
pub use walk::collect_items;
