//! Sentry → Linear sync
//!
//! One sync moves exactly one user-selected Sentry issue into Linear:
//!
//! 1. resolve the mapping (connection + Sentry project)
//! 2. list unresolved issues and let the user pick one
//! 3. fetch the issue and, best effort, its latest event
//! 4. derive the Linear draft and show a preview
//! 5. on confirmation: pick a state, get-or-create labels, create the issue
//! 6. optionally resolve the Sentry issue
//!
//! Nothing is written to Linear before the confirmation in step 4.

use super::transform::{self, BugDetails, LabelPalette};
use crate::config::{BugBridgeConfig, Settings};
use crate::connections::{self, parse_source_path, Connection, ResolvedMapping};
use crate::integrations::{
    ClientFactory, CreatedIssue, IssueDraft, SentryIssue, SinkApi, SourceApi, WorkflowState,
};
use crate::prompt::{Preview, Prompter};
use crate::registry::{Linear, Sentry};
use crate::{BugBridgeError, Result};
use tracing::{debug, info, warn};

/// Knobs for a single sync
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Maximum number of unresolved issues offered
    pub limit: u32,
    pub palette: LabelPalette,
}

impl SyncOptions {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            palette: LabelPalette::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.issue_fetch_limit)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Result of one sync
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// The Sentry project had no unresolved issues
    NothingToSync,
    Created(SyncedIssue),
}

impl SyncOutcome {
    pub fn created(&self) -> Option<&SyncedIssue> {
        match self {
            SyncOutcome::Created(synced) => Some(synced),
            SyncOutcome::NothingToSync => None,
        }
    }
}

/// A Sentry issue that now exists in Linear
#[derive(Debug, Clone)]
pub struct SyncedIssue {
    pub source_id: String,
    pub source_short_id: String,
    pub issue: CreatedIssue,
    /// Labels that could not be found or created and were left off
    pub skipped_labels: Vec<String>,
    /// True when the Sentry issue was marked resolved
    pub resolved_in_source: bool,
    /// Why resolving in Sentry failed, if it was attempted and failed
    pub resolve_warning: Option<String>,
}

/// What the user asked to sync
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncRequest {
    pub connection: Option<String>,
    /// `org/project`
    pub project: Option<String>,
    /// Overrides `settings.issue_fetch_limit`
    pub limit: Option<u32>,
}

/// Pick a connection and one of its mappings, then resolve both instances
///
/// Explicit names win; a single candidate is chosen without asking.
pub fn choose_mapping(
    config: &BugBridgeConfig,
    connection: Option<&str>,
    project: Option<&str>,
    prompter: &mut dyn Prompter,
) -> Result<ResolvedMapping> {
    let conns = &config.bug_manager.connections;
    if conns.is_empty() {
        return Err(BugBridgeError::Config(
            "No Sentry-Linear connections configured. Add one with `bugbridge connection add`"
                .to_string(),
        ));
    }

    let conn = match connection {
        Some(name) => config
            .get_connection(name)
            .ok_or_else(|| BugBridgeError::NotFound(format!("connection '{}'", name)))?,
        None if conns.len() == 1 => &conns[0],
        None => {
            let items: Vec<String> = conns.iter().map(|c| connection_line(config, c)).collect();
            let choice = prompter.select("Select connection", &items, 0)?;
            &conns[choice]
        }
    };

    if conn.project_mappings.is_empty() {
        return Err(BugBridgeError::Config(format!(
            "Connection '{}' has no project mappings. Add one with `bugbridge mapping add {}`",
            conn.name, conn.name
        )));
    }

    if let Some(path) = project {
        let (org, proj) = parse_source_path(path)?;
        return connections::resolve_project(config, &conn.name, &org, &proj);
    }

    let index = if conn.project_mappings.len() == 1 {
        0
    } else {
        let items: Vec<String> = conn
            .project_mappings
            .iter()
            .map(|m| format!("{} → {}", m.source_path(), m.target_display()))
            .collect();
        prompter.select("Select Sentry project", &items, 0)?
    };

    connections::resolve(config, &conn.name, index)
}

/// `main: Acme Sentry → Acme Linear (2 mappings)`
pub fn connection_line(config: &BugBridgeConfig, conn: &Connection) -> String {
    let sentry = config
        .sentry
        .instances
        .get(conn.sentry_instance.as_str())
        .map(|i| i.name.as_str())
        .unwrap_or("Unknown");
    let linear = config
        .linear
        .instances
        .get(conn.linear_instance.as_str())
        .map(|i| i.name.as_str())
        .unwrap_or("Unknown");
    format!(
        "{}: {} → {} ({} mappings)",
        conn.name,
        sentry,
        linear,
        conn.project_mappings.len()
    )
}

/// Sync one Sentry issue of the resolved project into Linear
pub async fn sync_one(
    resolved: &ResolvedMapping,
    source: &dyn SourceApi,
    sink: &dyn SinkApi,
    prompter: &mut dyn Prompter,
    options: &SyncOptions,
) -> Result<SyncOutcome> {
    let org = resolved.sentry_organization();
    let project = resolved.sentry_project();

    prompter.info(&format!(
        "Fetching unresolved issues from {}/{}...",
        org, project
    ));
    let issues = source
        .list_unresolved_issues(org, project, options.limit)
        .await?;
    if issues.is_empty() {
        prompter.info("No unresolved issues found in Sentry!");
        return Ok(SyncOutcome::NothingToSync);
    }
    debug!(count = issues.len(), org = %org, project = %project, "Fetched candidates");

    let items: Vec<String> = issues.iter().map(transform::candidate_line).collect();
    let choice = prompter.select("Select issue to sync", &items, 0)?;
    let selected = &issues[choice];

    prompter.info("Fetching issue details...");
    let issue = source.get_issue(&selected.id).await?;

    prompter.info("Fetching error event details...");
    let event = match source.latest_event(&issue.id).await {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(issue = %issue.short_id, error = %e, "Latest event unavailable");
            prompter.warn(&format!("Could not fetch event details: {}", e));
            None
        }
    };

    let details = transform::prepare_bug_details(&issue, event.as_ref(), resolved.default_labels());

    prompter.preview(&issue_preview(resolved, &details));
    if !prompter.confirm("Create this issue in Linear?", true)? {
        info!(issue = %issue.short_id, "Sync declined at confirmation");
        return Err(BugBridgeError::UserCancelled);
    }

    let team_id = resolved.linear_team_id();
    let states = fetch_workflow_states(sink, team_id, prompter).await;
    let state_id = if states.is_empty() {
        None
    } else {
        let items: Vec<String> = states.iter().map(WorkflowState::display_name).collect();
        match prompter.select_optional("Select issue state", &items, 0)? {
            Some(i) => Some(states[i].id.clone()),
            None => {
                prompter.info("Using default state");
                None
            }
        }
    };

    let labels = apply_labels(sink, team_id, &details.labels, &options.palette, prompter).await;

    let draft = IssueDraft {
        team_id: team_id.to_string(),
        project_id: resolved.linear_project_id().map(str::to_string),
        title: details.title,
        description: details.description,
        label_names: labels.applied,
        priority: details.priority,
        state_id,
    };

    prompter.info("Creating issue in Linear...");
    let created = sink.create_issue(&draft, &labels.ids).await?;
    info!(
        source = %issue.short_id,
        linear = %created.identifier,
        connection = %resolved.connection,
        "Synced Sentry issue to Linear"
    );
    prompter.success(&format!("Issue created successfully!\nURL: {}", created.url));

    let (resolved_in_source, resolve_warning) = resolve_in_source(source, &issue, prompter).await?;

    Ok(SyncOutcome::Created(SyncedIssue {
        source_id: issue.id,
        source_short_id: issue.short_id,
        issue: created,
        skipped_labels: labels.skipped,
        resolved_in_source,
        resolve_warning,
    }))
}

fn issue_preview(resolved: &ResolvedMapping, details: &BugDetails) -> Preview {
    Preview::new("Issue Preview")
        .field("Title", details.title.as_str())
        .field("Priority", details.priority.name())
        .field("Target", resolved.mapping.target_display())
        .field("Labels", details.labels.join(", "))
        .body(transform::truncate_chars(
            &details.description,
            transform::PREVIEW_DESCRIPTION_CHARS,
        ))
}

async fn resolve_in_source(
    source: &dyn SourceApi,
    issue: &SentryIssue,
    prompter: &mut dyn Prompter,
) -> Result<(bool, Option<String>)> {
    // The Linear issue exists at this point, so Esc just means "no"
    let wanted = match prompter.confirm("Mark this issue as resolved in Sentry?", false) {
        Ok(yes) => yes,
        Err(e) if e.is_cancelled() => false,
        Err(e) => return Err(e),
    };
    if !wanted {
        return Ok((false, None));
    }

    match source.resolve_issue(&issue.id).await {
        Ok(()) => {
            prompter.success("Issue marked as resolved in Sentry");
            Ok((true, None))
        }
        Err(e) => {
            warn!(issue = %issue.short_id, error = %e, "Failed to resolve Sentry issue");
            let message = format!("Failed to mark issue as resolved: {}", e);
            prompter.warn(&message);
            Ok((false, Some(message)))
        }
    }
}

/// Workflow states of a team; a failure degrades to "none" with a warning
pub(crate) async fn fetch_workflow_states(
    sink: &dyn SinkApi,
    team_id: &str,
    prompter: &mut dyn Prompter,
) -> Vec<WorkflowState> {
    prompter.info("Fetching workflow states...");
    match sink.list_workflow_states(team_id).await {
        Ok(states) => states,
        Err(e) => {
            warn!(team = %team_id, error = %e, "Workflow states unavailable");
            prompter.warn(&format!("Could not fetch workflow states: {}", e));
            Vec::new()
        }
    }
}

/// Labels resolved against a team
#[derive(Debug, Default)]
pub(crate) struct AppliedLabels {
    pub ids: Vec<String>,
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Get-or-create every label; failures are skipped with a warning
pub(crate) async fn apply_labels(
    sink: &dyn SinkApi,
    team_id: &str,
    labels: &[String],
    palette: &LabelPalette,
    prompter: &mut dyn Prompter,
) -> AppliedLabels {
    let mut out = AppliedLabels::default();
    if labels.is_empty() {
        return out;
    }

    prompter.info("Creating labels...");
    for label in labels {
        match sink
            .get_or_create_label(team_id, label, palette.color_for(label))
            .await
        {
            Ok(id) => {
                out.ids.push(id);
                out.applied.push(label.clone());
            }
            Err(e) => {
                warn!(label = %label, error = %e, "Skipping label");
                prompter.warn(&format!("Failed to create label '{}': {}", label, e));
                out.skipped.push(label.clone());
            }
        }
    }
    out
}

/// Interactive session: resolve once, then sync issues until the user stops
///
/// Cancelling a later round ends the session and keeps what was already
/// synced; cancelling the first round is returned as `UserCancelled`.
pub async fn run_session(
    config: &BugBridgeConfig,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
    request: &SyncRequest,
) -> Result<Vec<SyncOutcome>> {
    let mut options = SyncOptions::from_settings(&config.settings);
    if let Some(limit) = request.limit {
        options.limit = limit;
    }
    if options.limit == 0 {
        return Err(BugBridgeError::Config("Issue fetch limit must be at least 1".to_string()));
    }

    let resolved = choose_mapping(
        config,
        request.connection.as_deref(),
        request.project.as_deref(),
        prompter,
    )?;
    debug!(
        sentry = %resolved.sentry.endpoint::<Sentry>(),
        linear = %resolved.linear.endpoint::<Linear>(),
        "Opening clients"
    );
    let source = factory.source(&resolved.sentry)?;
    let sink = factory.sink(&resolved.linear)?;

    let mut outcomes = Vec::new();
    loop {
        match sync_one(&resolved, source.as_ref(), sink.as_ref(), prompter, &options).await {
            Ok(SyncOutcome::NothingToSync) => {
                outcomes.push(SyncOutcome::NothingToSync);
                break;
            }
            Ok(outcome) => outcomes.push(outcome),
            Err(e) if e.is_cancelled() && !outcomes.is_empty() => {
                prompter.info("Issue creation cancelled");
                break;
            }
            Err(e) => return Err(e),
        }

        match prompter.confirm("Sync another issue from the same project?", false) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!(error = %e, "Prompt failed after a completed sync");
                break;
            }
        }
    }
    Ok(outcomes)
}
