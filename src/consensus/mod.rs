//! Consensus engine: reviewer output parsing and the verdict decision
//! tree.

mod engine;
mod parse;
mod types;

pub use engine::{decide, ConsensusEngine};
pub use parse::parse_verdict;
pub use types::{Provenance, Review, Verdict, VulnKind};
