//! Notification dispatcher: severity filtering, tracker integration, and
//! the periodic worker that turns scans into tickets.

mod dispatcher;
mod filter;
mod tracker;

pub use dispatcher::{Dispatcher, TickSummary};
pub use filter::{is_qualifying, qualifying_vulnerabilities};
pub use tracker::{
    build_issue_description, build_issue_title, IssueTypeRef, TicketSink, TrackerClient,
    TrackerStatus,
};
