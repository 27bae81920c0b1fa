//! Sentry issue → Linear draft
//!
//! Pure functions: title, markdown description, priority and labels are all
//! derived from the issue (plus the latest event when one was fetched).

use crate::connections::normalize_labels;
use crate::integrations::{ExceptionValue, Priority, SentryEvent, SentryIssue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Write;

/// Users affected above which an issue is always urgent
pub const HIGH_IMPACT_USERS: u64 = 100;

/// Users affected above which an issue is at least high priority
pub const MEDIUM_IMPACT_USERS: u64 = 50;

/// Characters of description shown in the preview
pub const PREVIEW_DESCRIPTION_CHARS: usize = 500;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Derived Linear fields for one Sentry issue
#[derive(Debug, Clone, PartialEq)]
pub struct BugDetails {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// Mapping defaults first, then issue-derived labels
    pub labels: Vec<String>,
}

/// Build everything the Linear issue needs from a Sentry issue
pub fn prepare_bug_details(
    issue: &SentryIssue,
    event: Option<&SentryEvent>,
    default_labels: &[String],
) -> BugDetails {
    BugDetails {
        title: issue_title(issue),
        description: issue_description(issue, event),
        priority: calculate_priority(&issue.level, issue.user_count),
        labels: issue_labels(issue, default_labels),
    }
}

/// `[Sentry ABC-1] NullPointerException`
pub fn issue_title(issue: &SentryIssue) -> String {
    format!("[Sentry {}] {}", issue.short_id, issue.title)
}

/// Priority from severity, raised (never lowered) by user impact
pub fn calculate_priority(level: &str, user_count: u64) -> Priority {
    let base = match level {
        "fatal" | "critical" => Priority::Urgent,
        "error" => Priority::High,
        "warning" => Priority::Medium,
        "info" | "debug" => Priority::Low,
        _ => Priority::Medium,
    };

    if user_count > HIGH_IMPACT_USERS && !base.at_least_as_urgent_as(Priority::Urgent) {
        Priority::Urgent
    } else if user_count > MEDIUM_IMPACT_USERS && !base.at_least_as_urgent_as(Priority::High) {
        Priority::High
    } else {
        base
    }
}

/// Labels derived from the issue itself
pub fn sentry_labels(issue: &SentryIssue) -> Vec<String> {
    let mut labels = Vec::new();
    if !issue.level.is_empty() {
        labels.push(format!("level:{}", issue.level));
    }
    if !issue.platform.is_empty() {
        labels.push(format!("platform:{}", issue.platform));
    }

    if issue.user_count > HIGH_IMPACT_USERS {
        labels.push("high-impact".to_string());
    } else if issue.user_count > MEDIUM_IMPACT_USERS {
        labels.push("medium-impact".to_string());
    }
    labels
}

/// Mapping defaults followed by issue labels, without duplicates
pub fn issue_labels(issue: &SentryIssue, default_labels: &[String]) -> Vec<String> {
    normalize_labels(
        default_labels
            .iter()
            .cloned()
            .chain(sentry_labels(issue)),
    )
}

/// Colors for labels bugbridge creates
///
/// Exact names win, then `prefix*` rules in order, then the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPalette {
    exact: HashMap<String, String>,
    prefixes: Vec<(String, String)>,
    fallback: String,
}

impl LabelPalette {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            fallback: fallback.into(),
        }
    }

    pub fn with_color(mut self, label: impl Into<String>, color: impl Into<String>) -> Self {
        self.exact.insert(label.into(), color.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>, color: impl Into<String>) -> Self {
        self.prefixes.push((prefix.into(), color.into()));
        self
    }

    pub fn color_for(&self, label: &str) -> &str {
        if let Some(color) = self.exact.get(label) {
            return color;
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| label.starts_with(prefix.as_str()))
            .map(|(_, color)| color.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

impl Default for LabelPalette {
    fn default() -> Self {
        Self::new("#6b7280")
            .with_color("bug", "#e11d48")
            .with_color("sentry", "#8b5cf6")
            .with_color("level:fatal", "#991b1b")
            .with_color("level:error", "#dc2626")
            .with_color("level:warning", "#f59e0b")
            .with_color("level:info", "#3b82f6")
            .with_color("high-impact", "#ef4444")
            .with_color("medium-impact", "#f97316")
            .with_prefix("level:", "#8b5cf6")
            .with_prefix("platform:", "#10b981")
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Markdown body of the Linear issue
pub fn issue_description(issue: &SentryIssue, event: Option<&SentryEvent>) -> String {
    let mut d = String::new();

    // Writing to a String cannot fail
    let _ = write!(d, "## Sentry Bug Report\n\n");
    let _ = writeln!(d, "**Sentry Issue:** [{}]({})", issue.short_id, issue.permalink);
    let _ = writeln!(d, "**Level:** {}", issue.level);
    let _ = writeln!(d, "**Platform:** {}", issue.platform);
    let _ = writeln!(d, "**First Seen:** {}", timestamp(issue.first_seen));
    let _ = writeln!(d, "**Last Seen:** {}", timestamp(issue.last_seen));
    let _ = writeln!(d, "**Occurrences:** {}", issue.count);
    let _ = write!(d, "**Users Affected:** {}\n\n", issue.user_count);

    let _ = write!(d, "## Error Details\n\n");
    let _ = write!(d, "**Culprit:** `{}`\n\n", issue.culprit);

    if !issue.metadata.is_empty() {
        d.push_str("## Additional Information\n\n");
        if let Some(value) = issue.metadata_str("value") {
            let _ = write!(d, "**Error Message:** {}\n\n", value);
        }
        if let Some(kind) = issue.metadata_str("type") {
            let _ = write!(d, "**Error Type:** `{}`\n\n", kind);
        }
        if let Some(filename) = issue.metadata_str("filename") {
            let _ = writeln!(d, "**File:** `{}`", filename);
        }
        if let Some(function) = issue.metadata_str("function") {
            let _ = writeln!(d, "**Function:** `{}`", function);
        }
        if let Some(line) = issue.metadata_u64("lineNo") {
            let _ = writeln!(d, "**Line Number:** {}", line);
        }
    }

    let exceptions = event.map(SentryEvent::exceptions).unwrap_or_default();
    if !exceptions.is_empty() {
        d.push_str(&stack_trace_section(&exceptions));
    }

    let _ = write!(d, "\n---\n\n[View in Sentry]({})", issue.permalink);
    d
}

fn stack_trace_section(exceptions: &[ExceptionValue]) -> String {
    let mut d = String::from("\n## Stack Trace\n\n");

    for exception in exceptions {
        if !exception.kind.is_empty() || !exception.value.is_empty() {
            let _ = write!(d, "**Exception:** `{}: {}`\n\n", exception.kind, exception.value);
        }

        let frames = exception.frames();
        if !frames.is_empty() {
            d.push_str("```\n");
            // Most recent call first
            for frame in frames.iter().rev().filter(|f| f.in_app) {
                let _ = writeln!(
                    d,
                    "  at {} in {}:{}:{}",
                    frame.function, frame.filename, frame.line_no, frame.col_no
                );
            }
            d.push_str("```\n\n");
        }
    }

    let location = exceptions
        .first()
        .and_then(|e| e.frames().iter().rev().find(|f| f.in_app && f.line_no > 0));
    if let Some(frame) = location {
        let _ = write!(
            d,
            "**Error Location:** `{}:{}` in function `{}`\n\n",
            frame.filename, frame.line_no, frame.function
        );
    }

    d
}

/// First `max_chars` characters, with an ellipsis when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// One line per candidate in the issue picker
pub fn candidate_line(issue: &SentryIssue) -> String {
    format!(
        "[{}] {} (Level: {}, Count: {}, Users: {})",
        issue.short_id, issue.title, issue.level, issue.count, issue.user_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::sentry::{ExceptionInterface, Frame, Stacktrace};

    fn issue(level: &str, users: u64) -> SentryIssue {
        SentryIssue {
            id: "4711".to_string(),
            short_id: "ABC-1".to_string(),
            title: "NullPointer".to_string(),
            culprit: "app.handler".to_string(),
            permalink: "https://sentry.io/issues/4711/".to_string(),
            count: 12,
            user_count: users,
            level: level.to_string(),
            platform: "python".to_string(),
            ..Default::default()
        }
    }

    fn frame(function: &str, line: u32, in_app: bool) -> Frame {
        Frame {
            filename: format!("{}.py", function),
            function: function.to_string(),
            line_no: line,
            col_no: 4,
            in_app,
            ..Default::default()
        }
    }

    #[test]
    fn test_priority_from_level() {
        assert_eq!(calculate_priority("fatal", 0), Priority::Urgent);
        assert_eq!(calculate_priority("critical", 0), Priority::Urgent);
        assert_eq!(calculate_priority("error", 0), Priority::High);
        assert_eq!(calculate_priority("warning", 0), Priority::Medium);
        assert_eq!(calculate_priority("info", 0), Priority::Low);
        assert_eq!(calculate_priority("debug", 0), Priority::Low);
        assert_eq!(calculate_priority("sample", 0), Priority::Medium);
    }

    #[test]
    fn test_priority_raised_by_impact() {
        assert_eq!(calculate_priority("error", 10), Priority::High);
        assert_eq!(calculate_priority("error", 60), Priority::High);
        assert_eq!(calculate_priority("error", 150), Priority::Urgent);
        assert_eq!(calculate_priority("info", 51), Priority::High);
        assert_eq!(calculate_priority("info", 50), Priority::Low);
        assert_eq!(calculate_priority("warning", 101), Priority::Urgent);
    }

    #[test]
    fn test_priority_never_loosens_with_more_users() {
        for level in ["fatal", "error", "warning", "info", "debug", "other"] {
            let mut previous = calculate_priority(level, 0);
            for users in [10, 50, 51, 75, 100, 101, 1000] {
                let current = calculate_priority(level, users);
                assert!(current.at_least_as_urgent_as(previous));
                previous = current;
            }
        }
    }

    #[test]
    fn test_labels() {
        let defaults = vec!["bug".to_string(), "sentry".to_string()];
        let labels = issue_labels(&issue("error", 75), &defaults);
        assert_eq!(
            labels,
            vec!["bug", "sentry", "level:error", "platform:python", "medium-impact"]
        );

        let labels = issue_labels(&issue("fatal", 500), &[]);
        assert!(labels.contains(&"high-impact".to_string()));
        assert!(!labels.contains(&"medium-impact".to_string()));
    }

    #[test]
    fn test_labels_deduplicate_against_defaults() {
        let defaults = vec!["level:error".to_string(), "bug".to_string()];
        let labels = issue_labels(&issue("error", 0), &defaults);
        assert_eq!(labels, vec!["level:error", "bug", "platform:python"]);
    }

    #[test]
    fn test_palette() {
        let palette = LabelPalette::default();
        assert_eq!(palette.color_for("bug"), "#e11d48");
        assert_eq!(palette.color_for("level:error"), "#dc2626");
        assert_eq!(palette.color_for("level:debug"), "#8b5cf6");
        assert_eq!(palette.color_for("platform:go"), "#10b981");
        assert_eq!(palette.color_for("backend"), "#6b7280");

        let custom = LabelPalette::new("#000000").with_color("bug", "#ffffff");
        assert_eq!(custom.color_for("bug"), "#ffffff");
        assert_eq!(custom.color_for("sentry"), "#000000");
    }

    #[test]
    fn test_title() {
        assert_eq!(issue_title(&issue("error", 0)), "[Sentry ABC-1] NullPointer");
    }

    #[test]
    fn test_description_without_event() {
        let mut issue = issue("error", 3);
        issue.first_seen = "2024-05-01T10:20:30Z".parse().ok();
        let description = issue_description(&issue, None);

        assert!(description.starts_with(
            "## Sentry Bug Report\n\n**Sentry Issue:** [ABC-1](https://sentry.io/issues/4711/)\n"
        ));
        assert!(description.contains("**First Seen:** 2024-05-01 10:20:30\n"));
        assert!(description.contains("**Last Seen:** unknown\n"));
        assert!(description.contains(
            "**Users Affected:** 3\n\n## Error Details\n\n**Culprit:** `app.handler`\n\n"
        ));
        assert!(!description.contains("## Additional Information"));
        assert!(!description.contains("## Stack Trace"));
        assert!(description.ends_with("\n---\n\n[View in Sentry](https://sentry.io/issues/4711/)"));
    }

    #[test]
    fn test_description_metadata() {
        let mut issue = issue("error", 3);
        issue.metadata.insert("value".into(), "boom".into());
        issue.metadata.insert("type".into(), "KeyError".into());
        issue.metadata.insert("lineNo".into(), serde_json::json!(0));

        let description = issue_description(&issue, None);
        assert!(description.contains(
            "## Additional Information\n\n**Error Message:** boom\n\n**Error Type:** `KeyError`\n\n"
        ));
        assert!(!description.contains("**Line Number:**"));
    }

    #[test]
    fn test_description_stack_trace() {
        let event = SentryEvent {
            exception: Some(ExceptionInterface {
                values: vec![ExceptionValue {
                    kind: "KeyError".to_string(),
                    value: "'id'".to_string(),
                    stacktrace: Some(Stacktrace {
                        frames: vec![
                            frame("main", 10, true),
                            frame("library", 99, false),
                            frame("handler", 42, true),
                        ],
                    }),
                }],
            }),
            ..Default::default()
        };

        let description = issue_description(&issue("error", 1), Some(&event));
        let trace = "\n## Stack Trace\n\n**Exception:** `KeyError: 'id'`\n\n```\n\
                     \x20 at handler in handler.py:42:4\n\
                     \x20 at main in main.py:10:4\n```\n\n";
        assert!(description.contains(trace));
        assert!(!description.contains("library"));
        assert!(description
            .contains("**Error Location:** `handler.py:42` in function `handler`\n\n"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("ééééé", 2), "éé...");
    }

    #[test]
    fn test_candidate_line() {
        assert_eq!(
            candidate_line(&issue("error", 75)),
            "[ABC-1] NullPointer (Level: error, Count: 12, Users: 75)"
        );
    }

    #[test]
    fn test_prepare_bug_details_end_to_end_case() {
        let defaults = vec!["bug".to_string(), "sentry".to_string()];
        let details = prepare_bug_details(&issue("error", 75), None, &defaults);
        assert_eq!(details.priority, Priority::High);
        assert_eq!(details.priority.value(), 2);
        assert_eq!(details.title, "[Sentry ABC-1] NullPointer");
        for label in ["bug", "sentry", "level:error", "platform:python", "medium-impact"] {
            assert!(details.labels.iter().any(|l| l == label));
        }
    }
}
