//! Persistent store: scan results, red-team findings, tracker tickets,
//! and processing checkpoints over one shared SQLite database.

mod schema;
mod store;
mod types;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::SentinelStore;
pub use types::{
    Finding, FindingStatus, FindingUpdate, NewFinding, NewScan, NewTicket, TicketRecord,
};
