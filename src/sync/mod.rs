//! Issue sync
//!
//! - [`transform`]: pure Sentry issue → Linear draft derivation
//! - [`orchestrator`]: the interactive Sentry → Linear flow
//! - [`manual`]: hand-written Linear issues

pub mod manual;
pub mod orchestrator;
pub mod transform;

pub use manual::{create_manual_issue, IssueType};
pub use orchestrator::{
    choose_mapping, connection_line, run_session, sync_one, SyncOptions, SyncOutcome, SyncRequest,
    SyncedIssue,
};
pub use transform::{
    calculate_priority, candidate_line, issue_description, issue_labels, issue_title,
    prepare_bug_details, sentry_labels, BugDetails, LabelPalette,
};
