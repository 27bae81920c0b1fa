//! Manual Linear issue creation
//!
//! Files a hand-written issue into any Linear team, without a Sentry source.

use super::orchestrator::{apply_labels, fetch_workflow_states};
use super::transform::{truncate_chars, LabelPalette, PREVIEW_DESCRIPTION_CHARS};
use crate::config::BugBridgeConfig;
use crate::connections::parse_label_list;
use crate::integrations::{ClientFactory, CreatedIssue, IssueDraft, Priority, WorkflowState};
use crate::prompt::{any_input, Preview, Prompter};
use crate::registry::{Instance, InstanceKey};
use crate::{BugBridgeError, Result};
use std::fmt;
use tracing::info;

/// Minimum title length, in characters
pub const MIN_TITLE_CHARS: usize = 3;

/// Kind of work item; also the title prefix and default label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    Bug,
    Feature,
    Task,
    Improvement,
    Story,
}

impl IssueType {
    pub const ALL: [IssueType; 5] = [
        IssueType::Bug,
        IssueType::Feature,
        IssueType::Task,
        IssueType::Improvement,
        IssueType::Story,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IssueType::Bug => "Bug",
            IssueType::Feature => "Feature",
            IssueType::Task => "Task",
            IssueType::Improvement => "Improvement",
            IssueType::Story => "Story",
        }
    }

    pub fn default_label(self) -> String {
        self.name().to_lowercase()
    }

    /// `[Bug] title`, unless the title already starts with the type name
    pub fn prefix_title(self, title: &str) -> String {
        let title = title.trim();
        if title.to_lowercase().starts_with(&self.default_label()) {
            title.to_string()
        } else {
            format!("[{}] {}", self.name(), title)
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn title_long_enough(value: &str) -> std::result::Result<(), String> {
    if value.trim().chars().count() < MIN_TITLE_CHARS {
        Err(format!("Title must be at least {} characters", MIN_TITLE_CHARS))
    } else {
        Ok(())
    }
}

/// Pick the Linear instance: explicit key, the only one, or ask
fn choose_linear_instance<'a>(
    config: &'a BugBridgeConfig,
    key: Option<&str>,
    prompter: &mut dyn Prompter,
) -> Result<(&'a InstanceKey, &'a Instance)> {
    let instances: Vec<(&InstanceKey, &Instance)> = config.linear.instances.iter().collect();
    if instances.is_empty() {
        return Err(BugBridgeError::Config(
            "No Linear instances configured. Add one with `bugbridge instance add linear`"
                .to_string(),
        ));
    }

    if let Some(key) = key {
        return instances
            .into_iter()
            .find(|(k, _)| k.as_str() == key)
            .ok_or_else(|| BugBridgeError::NotFound(format!("Linear instance '{}'", key)));
    }

    if instances.len() == 1 {
        return Ok(instances[0]);
    }

    let items: Vec<String> = instances
        .iter()
        .map(|(k, i)| format!("{} ({})", i.name, k))
        .collect();
    let choice = prompter.select("Select Linear instance", &items, 0)?;
    Ok(instances[choice])
}

/// Walk the user through creating one Linear issue
///
/// Returns `Ok(None)` when the chosen instance has no teams.
pub async fn create_manual_issue(
    config: &BugBridgeConfig,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
    instance: Option<&str>,
) -> Result<Option<CreatedIssue>> {
    let (key, instance) = choose_linear_instance(config, instance, prompter)?;
    let sink = factory.sink(instance)?;

    prompter.info("Fetching Linear teams...");
    let teams = sink.list_teams().await?;
    if teams.is_empty() {
        prompter.warn("No teams found in Linear.");
        return Ok(None);
    }
    let items: Vec<String> = teams
        .iter()
        .map(|t| format!("{} ({})", t.name, t.key))
        .collect();
    let team = &teams[prompter.select("Select team", &items, 0)?];

    prompter.info("Fetching projects...");
    let projects = sink.list_projects(&team.id).await?;
    let project = if projects.is_empty() {
        None
    } else {
        let mut items = vec!["No Project (Team only)".to_string()];
        items.extend(projects.iter().map(|p| p.name.clone()));
        match prompter.select("Select project (optional)", &items, 0)? {
            0 => None,
            i => Some(&projects[i - 1]),
        }
    };

    let types: Vec<String> = IssueType::ALL.iter().map(|t| t.to_string()).collect();
    let issue_type = IssueType::ALL[prompter.select("Select issue type", &types, 0)?];

    let raw_title = prompter.input("Issue title", None, &title_long_enough)?;
    let title = issue_type.prefix_title(&raw_title);

    let description = prompter.multiline("Issue description")?;

    let priorities: Vec<String> = Priority::ALL.iter().map(|p| p.name().to_string()).collect();
    let priority = Priority::ALL[prompter.select("Select priority", &priorities, 0)?];

    let default_labels = issue_type.default_label();
    let labels_input = prompter.input(
        "Labels (comma-separated, press Enter to skip)",
        Some(default_labels.as_str()),
        &any_input,
    )?;
    let labels = parse_label_list(&labels_input);

    let states = fetch_workflow_states(sink.as_ref(), &team.id, prompter).await;
    let state: Option<&WorkflowState> = if states.is_empty() {
        None
    } else {
        let items: Vec<String> = states.iter().map(WorkflowState::display_name).collect();
        Some(&states[prompter.select("Select initial state", &items, 0)?])
    };

    let mut summary = Preview::new("Issue Summary")
        .field("Linear Instance", instance.name.as_str())
        .field("Type", issue_type.name())
        .field("Title", title.as_str())
        .field("Team", team.name.as_str());
    if let Some(project) = project {
        summary = summary.field("Project", project.name.as_str());
    }
    if let Some(state) = state {
        summary = summary.field("State", state.name.as_str());
    }
    summary = summary
        .field("Priority", priority.name())
        .field("Labels", labels.join(", "));
    if !description.is_empty() {
        summary = summary.body(truncate_chars(&description, PREVIEW_DESCRIPTION_CHARS));
    }
    prompter.preview(&summary);

    if !prompter.confirm("Create this issue in Linear?", true)? {
        return Err(BugBridgeError::UserCancelled);
    }

    let applied = apply_labels(
        sink.as_ref(),
        &team.id,
        &labels,
        &LabelPalette::default(),
        prompter,
    )
    .await;

    let draft = IssueDraft {
        team_id: team.id.clone(),
        project_id: project.map(|p| p.id.clone()),
        title,
        description,
        label_names: applied.applied,
        priority,
        state_id: state.map(|s| s.id.clone()),
    };

    prompter.info("Creating issue in Linear...");
    let created = sink.create_issue(&draft, &applied.ids).await?;
    info!(instance = %key, issue = %created.identifier, "Created manual issue");
    prompter.success(&format!("Issue created successfully!\nURL: {}", created.url));

    Ok(Some(created))
}
