//! Connection and project mapping types

use crate::config::serde_ext::{empty_string_as_none, null_as_default};
use crate::registry::InstanceKey;
use crate::{BugBridgeError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// A named pairing of one Sentry instance with one Linear instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,

    pub linear_instance: InstanceKey,

    pub sentry_instance: InstanceKey,

    #[serde(default, deserialize_with = "null_as_default")]
    pub project_mappings: Vec<ProjectMapping>,
}

impl Connection {
    pub fn new(
        name: impl Into<String>,
        sentry_instance: InstanceKey,
        linear_instance: InstanceKey,
    ) -> Self {
        Self {
            name: name.into(),
            linear_instance,
            sentry_instance,
            project_mappings: Vec::new(),
        }
    }

    /// Index of the mapping for a Sentry project
    pub fn mapping_index(&self, organization: &str, project: &str) -> Option<usize> {
        self.project_mappings
            .iter()
            .position(|m| m.matches(organization, project))
    }

    pub fn mapping(&self, organization: &str, project: &str) -> Option<&ProjectMapping> {
        self.mapping_index(organization, project)
            .map(|i| &self.project_mappings[i])
    }
}

/// Routes issues of one Sentry project into one Linear team (and optionally project)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMapping {
    pub sentry_organization: String,

    pub sentry_project: String,

    pub linear_team_id: String,

    /// `None` files issues at team level
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_string_as_none"
    )]
    pub linear_project_id: Option<String>,

    #[serde(default)]
    pub linear_project_name: String,

    /// Labels applied to every synced issue
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub default_labels: Vec<String>,
}

impl ProjectMapping {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        team_id: impl Into<String>,
    ) -> Self {
        Self {
            sentry_organization: organization.into(),
            sentry_project: project.into(),
            linear_team_id: team_id.into(),
            linear_project_id: None,
            linear_project_name: String::new(),
            default_labels: Vec::new(),
        }
    }

    pub fn with_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.set_default_labels(labels);
        self
    }

    /// Target Linear project; a blank id means team-level
    pub fn set_project(&mut self, project_id: Option<String>, project_name: impl Into<String>) {
        self.linear_project_id = project_id.filter(|id| !id.trim().is_empty());
        self.linear_project_name = project_name.into();
    }

    pub fn set_default_labels<I, L>(&mut self, labels: I)
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.default_labels = normalize_labels(labels);
    }

    pub fn matches(&self, organization: &str, project: &str) -> bool {
        self.sentry_organization == organization && self.sentry_project == project
    }

    /// `org/project`
    pub fn source_path(&self) -> String {
        format!("{}/{}", self.sentry_organization, self.sentry_project)
    }

    /// Linear side as shown to users
    pub fn target_display(&self) -> String {
        match (&self.linear_project_id, self.linear_project_name.is_empty()) {
            (_, false) => self.linear_project_name.clone(),
            (Some(id), true) => id.clone(),
            (None, true) => "Team only".to_string(),
        }
    }
}

/// Trim, drop blanks and duplicates, keeping first-occurrence order
pub fn normalize_labels<I, L>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = L>,
    L: Into<String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for label in labels {
        let label = label.into();
        let label = label.trim();
        if !label.is_empty() && seen.insert(label.to_string()) {
            out.push(label.to_string());
        }
    }
    out
}

/// Split a comma-separated label list
pub fn parse_label_list(input: &str) -> Vec<String> {
    normalize_labels(input.split(','))
}

/// Parse `org/project`
pub fn parse_source_path(path: &str) -> Result<(String, String)> {
    match path.split_once('/') {
        Some((org, project)) if !org.is_empty() && !project.is_empty() => {
            Ok((org.to_string(), project.to_string()))
        }
        _ => Err(BugBridgeError::Config(format!(
            "Expected ORG/PROJECT, got '{}'",
            path
        ))),
    }
}

fn deserialize_labels<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let labels: Vec<String> = null_as_default(deserializer)?;
    Ok(normalize_labels(labels))
}
