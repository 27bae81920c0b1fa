//! Terminal styling utilities
//!
//! Consistent colors for priorities and CLI output.
//! Uses crossterm for cross-platform terminal colors.

use crate::integrations::Priority;
use crossterm::style::{StyledContent, Stylize};

/// Priority colors
/// - Urgent: Red
/// - High: Orange-ish
/// - Medium: Yellow
/// - Low / none: Dim
pub fn priority_style(priority: Priority) -> StyledContent<String> {
    let label = priority.name().to_string();
    match priority {
        Priority::Urgent => label.red().bold(),
        Priority::High => label.dark_yellow().bold(),
        Priority::Medium => label.yellow(),
        Priority::Low | Priority::NoPriority => label.dark_grey(),
    }
}

/// Section headers
pub fn header(text: &str) -> StyledContent<String> {
    text.to_string().bold()
}

/// Dim/muted text
pub fn dim(text: &str) -> StyledContent<String> {
    text.to_string().dark_grey()
}

/// Success text
pub fn success(text: &str) -> StyledContent<String> {
    text.to_string().green()
}

/// Warning text
pub fn warning(text: &str) -> StyledContent<String> {
    text.to_string().yellow()
}

/// Error text
pub fn error(text: &str) -> StyledContent<String> {
    text.to_string().red()
}

/// Issue identifiers (ABC-1, ENG-42)
pub fn issue_id(id: &str) -> StyledContent<String> {
    id.to_string().cyan()
}

/// Highlight important text (yellow)
pub fn highlight(text: &str) -> StyledContent<String> {
    text.to_string().yellow()
}

/// Path and URL styling
pub fn path(p: &str) -> StyledContent<String> {
    p.to_string().blue()
}
