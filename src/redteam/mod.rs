//! Red-team attack simulator over persisted vulnerabilities.

mod simulator;
mod templates;

pub use simulator::{AttackResult, AttackSimulator, CycleReport, ModelFilter};
pub use templates::{categorize, templates_for, AttackCategory, AttackTemplate};
