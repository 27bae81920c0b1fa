//! Linear Integration Adapter
//!
//! Issue creation in Linear using the GraphQL API: teams, projects, workflow
//! states, labels and issues.

use crate::registry::{Instance, Linear};
use crate::{BugBridgeError, Result, Service};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for every GraphQL call
const GRAPHQL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sink-side operations the sync needs
#[async_trait]
pub trait SinkApi: Send + Sync {
    async fn list_teams(&self) -> Result<Vec<LinearTeam>>;

    async fn list_projects(&self, team_id: &str) -> Result<Vec<LinearProject>>;

    async fn list_workflow_states(&self, team_id: &str) -> Result<Vec<WorkflowState>>;

    /// Label with exactly this name in the team, if any
    async fn find_label(&self, team_id: &str, name: &str) -> Result<Option<LinearLabel>>;

    async fn create_label(&self, team_id: &str, name: &str, color: &str) -> Result<LinearLabel>;

    /// Id of the named label, creating it when the team has none
    ///
    /// Lookup and creation are separate calls, so two concurrent callers can
    /// still both create the label.
    async fn get_or_create_label(&self, team_id: &str, name: &str, color: &str) -> Result<String> {
        if let Some(label) = self.find_label(team_id, name).await? {
            return Ok(label.id);
        }
        let label = self.create_label(team_id, name, color).await?;
        Ok(label.id)
    }

    async fn create_issue(&self, draft: &IssueDraft, label_ids: &[String]) -> Result<CreatedIssue>;
}

/// Linear issue priority
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize_repr,
    Deserialize_repr,
)]
#[repr(u8)]
pub enum Priority {
    #[default]
    NoPriority = 0,
    Urgent = 1,
    High = 2,
    Medium = 3,
    Low = 4,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::NoPriority,
        Priority::Urgent,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.value() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Priority::NoPriority => "No priority",
            Priority::Urgent => "Urgent",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        }
    }

    /// True when `self` is at least as urgent as `other` (no-priority is least)
    pub fn at_least_as_urgent_as(self, other: Priority) -> bool {
        self.urgency_rank() <= other.urgency_rank()
    }

    fn urgency_rank(self) -> u8 {
        match self {
            Priority::NoPriority => 5,
            p => p.value(),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Workflow state category, the `type` field of a Linear state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowCategory {
    Triage,
    Backlog,
    Unstarted,
    Started,
    Completed,
    Canceled,
}

impl WorkflowCategory {
    pub fn from_api(value: &str) -> Option<Self> {
        match value {
            "triage" => Some(Self::Triage),
            "backlog" => Some(Self::Backlog),
            "unstarted" => Some(Self::Unstarted),
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Suffix shown next to a state name in pickers
    pub fn display_suffix(self) -> &'static str {
        match self {
            Self::Triage => "Triage",
            Self::Backlog => "Backlog",
            Self::Unstarted => "Todo",
            Self::Started => "In Progress",
            Self::Completed => "Done",
            Self::Canceled => "Canceled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearTeam {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearLabel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub name: String,
    /// `None` for categories this client does not know
    #[serde(rename = "type", default, deserialize_with = "category_or_none")]
    pub category: Option<WorkflowCategory>,
    #[serde(default)]
    pub color: Option<String>,
}

impl WorkflowState {
    /// "In Review (In Progress)"; bare name for unknown categories
    pub fn display_name(&self) -> String {
        match self.category {
            Some(category) => format!("{} ({})", self.name, category.display_suffix()),
            None => self.name.clone(),
        }
    }
}

fn category_or_none<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<WorkflowCategory>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(WorkflowCategory::from_api))
}

/// Issue ready to be created in Linear
#[derive(Debug, Clone, PartialEq)]
pub struct IssueDraft {
    pub team_id: String,
    pub project_id: Option<String>,
    pub title: String,
    pub description: String,
    pub label_names: Vec<String>,
    pub priority: Priority,
    /// `None` lets Linear use the team's default state
    pub state_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueStateRef {
    pub id: String,
    pub name: String,
}

/// Issue as returned by `issueCreate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub id: String,
    #[serde(default)]
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, deserialize_with = "priority_from_number")]
    pub priority: Priority,
    #[serde(default)]
    pub state: Option<IssueStateRef>,
    #[serde(default, deserialize_with = "label_nodes")]
    pub labels: Vec<LinearLabel>,
}

/// Linear reports priority as a float
fn priority_from_number<'de, D>(deserializer: D) -> std::result::Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(Priority::from_value(raw.round().clamp(0.0, 4.0) as u8).unwrap_or_default())
}

fn label_nodes<'de, D>(deserializer: D) -> std::result::Result<Vec<LinearLabel>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Nodes<LinearLabel>>::deserialize(deserializer)?
        .map(|n| n.nodes)
        .unwrap_or_default())
}

/// GraphQL response wrapper
#[derive(Debug, Clone, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TeamsData {
    teams: Nodes<LinearTeam>,
}

#[derive(Debug, Deserialize)]
struct TeamData<T> {
    team: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TeamProjects {
    projects: Nodes<LinearProject>,
}

#[derive(Debug, Deserialize)]
struct TeamStates {
    states: Nodes<WorkflowState>,
}

#[derive(Debug, Deserialize)]
struct TeamLabels {
    labels: Nodes<LinearLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelCreateData {
    issue_label_create: LabelCreatePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelCreatePayload {
    success: bool,
    issue_label: Option<LinearLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCreateData {
    issue_create: IssueCreatePayload,
}

#[derive(Debug, Deserialize)]
struct IssueCreatePayload {
    success: bool,
    issue: Option<CreatedIssue>,
}

/// Linear GraphQL client for one instance
pub struct LinearClient {
    client: Client,
    graphql_url: String,
    api_key: String,
}

impl LinearClient {
    /// Create a client for a registered Linear instance
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(instance: &Instance) -> Result<Self> {
        let client = Client::builder()
            .timeout(GRAPHQL_TIMEOUT)
            .default_headers({
                let mut headers = header::HeaderMap::new();
                headers.insert(
                    header::USER_AGENT,
                    header::HeaderValue::from_static(concat!(
                        "bugbridge/",
                        env!("CARGO_PKG_VERSION")
                    )),
                );
                headers
            })
            .build()
            .map_err(|e| BugBridgeError::from_http(Service::Linear, e))?;

        Ok(Self {
            client,
            graphql_url: instance.endpoint::<Linear>().to_string(),
            api_key: instance.api_key.clone(),
        })
    }

    pub fn graphql_url(&self) -> &str {
        &self.graphql_url
    }

    /// Execute a GraphQL query
    async fn graphql<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({
            "query": query,
            "variables": variables,
        });

        // Personal API keys go in the header as-is, without a Bearer prefix
        let response = self
            .client
            .post(&self.graphql_url)
            .header(header::AUTHORIZATION, &self.api_key)
            .json(&body)
            .timeout(GRAPHQL_TIMEOUT)
            .send()
            .await
            .map_err(|e| BugBridgeError::from_http(Service::Linear, e))?;

        match response.status() {
            StatusCode::OK => {
                let result: GraphQLResponse<T> = response
                    .json()
                    .await
                    .map_err(|e| BugBridgeError::from_http(Service::Linear, e))?;
                if let Some(errors) = result.errors.filter(|e| !e.is_empty()) {
                    let error_msg = errors
                        .iter()
                        .map(|e| e.message.clone())
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(BugBridgeError::data(
                        Service::Linear,
                        format!("GraphQL error: {}", error_msg),
                    ));
                }
                result.data.ok_or_else(|| {
                    BugBridgeError::data(Service::Linear, "No data in GraphQL response")
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                BugBridgeError::sink_unavailable("Linear authentication failed"),
            ),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(BugBridgeError::sink_unavailable("Linear API rate limit exceeded"))
            }
            status if status.is_server_error() => {
                let error_body = response.text().await.unwrap_or_default();
                Err(BugBridgeError::sink_unavailable(format!(
                    "HTTP {}: {}",
                    status, error_body
                )))
            }
            status => {
                let error_body = response.text().await.unwrap_or_default();
                Err(BugBridgeError::data(
                    Service::Linear,
                    format!("HTTP {}: {}", status, error_body),
                ))
            }
        }
    }

    fn team_or_error<T>(team: Option<T>, team_id: &str) -> Result<T> {
        team.ok_or_else(|| {
            BugBridgeError::data(Service::Linear, format!("team '{}' not found", team_id))
        })
    }
}

#[async_trait]
impl SinkApi for LinearClient {
    async fn list_teams(&self) -> Result<Vec<LinearTeam>> {
        let query = r#"
            query {
                teams {
                    nodes { id name key }
                }
            }
        "#;

        let data: TeamsData = self.graphql(query, serde_json::json!({})).await?;
        info!(count = data.teams.nodes.len(), "Linear teams fetched");
        Ok(data.teams.nodes)
    }

    async fn list_projects(&self, team_id: &str) -> Result<Vec<LinearProject>> {
        let query = r#"
            query GetProjects($teamId: String!) {
                team(id: $teamId) {
                    projects {
                        nodes { id name description state }
                    }
                }
            }
        "#;

        debug!(team = %team_id, "Fetching Linear projects");
        let data: TeamData<TeamProjects> = self
            .graphql(query, serde_json::json!({ "teamId": team_id }))
            .await?;
        Ok(Self::team_or_error(data.team, team_id)?.projects.nodes)
    }

    async fn list_workflow_states(&self, team_id: &str) -> Result<Vec<WorkflowState>> {
        let query = r#"
            query GetWorkflowStates($teamId: String!) {
                team(id: $teamId) {
                    states {
                        nodes { id name type color }
                    }
                }
            }
        "#;

        debug!(team = %team_id, "Fetching Linear workflow states");
        let data: TeamData<TeamStates> = self
            .graphql(query, serde_json::json!({ "teamId": team_id }))
            .await?;
        Ok(Self::team_or_error(data.team, team_id)?.states.nodes)
    }

    async fn find_label(&self, team_id: &str, name: &str) -> Result<Option<LinearLabel>> {
        let query = r#"
            query GetLabel($teamId: String!, $name: String!) {
                team(id: $teamId) {
                    labels(filter: { name: { eq: $name } }) {
                        nodes { id name color }
                    }
                }
            }
        "#;

        let data: TeamData<TeamLabels> = self
            .graphql(query, serde_json::json!({ "teamId": team_id, "name": name }))
            .await?;
        let labels = Self::team_or_error(data.team, team_id)?.labels.nodes;
        Ok(labels.into_iter().find(|l| l.name == name))
    }

    async fn create_label(&self, team_id: &str, name: &str, color: &str) -> Result<LinearLabel> {
        let query = r#"
            mutation CreateLabel($teamId: String!, $name: String!, $color: String!) {
                issueLabelCreate(input: { teamId: $teamId, name: $name, color: $color }) {
                    success
                    issueLabel { id name color }
                }
            }
        "#;

        debug!(team = %team_id, label = %name, color = %color, "Creating Linear label");
        let data: LabelCreateData = self
            .graphql(
                query,
                serde_json::json!({ "teamId": team_id, "name": name, "color": color }),
            )
            .await?;

        match data.issue_label_create {
            LabelCreatePayload {
                success: true,
                issue_label: Some(label),
            } => Ok(label),
            _ => Err(BugBridgeError::data(
                Service::Linear,
                format!("failed to create label '{}'", name),
            )),
        }
    }

    async fn create_issue(&self, draft: &IssueDraft, label_ids: &[String]) -> Result<CreatedIssue> {
        let query = r#"
            mutation CreateIssue($input: IssueCreateInput!) {
                issueCreate(input: $input) {
                    success
                    issue {
                        id
                        identifier
                        title
                        priority
                        url
                        state { id name }
                        labels { nodes { id name color } }
                    }
                }
            }
        "#;

        let mut input = serde_json::json!({
            "teamId": draft.team_id,
            "title": draft.title,
            "description": draft.description,
            "labelIds": label_ids,
            "priority": draft.priority,
        });
        if let Some(ref project_id) = draft.project_id {
            input["projectId"] = serde_json::json!(project_id);
        }
        if let Some(ref state_id) = draft.state_id {
            input["stateId"] = serde_json::json!(state_id);
        }

        debug!(
            team = %draft.team_id,
            title = %draft.title,
            labels = label_ids.len(),
            "Creating Linear issue"
        );
        let data: IssueCreateData = self
            .graphql(query, serde_json::json!({ "input": input }))
            .await?;

        match data.issue_create {
            IssueCreatePayload {
                success: true,
                issue: Some(issue),
            } => {
                info!(issue = %issue.identifier, url = %issue.url, "Linear issue created");
                Ok(issue)
            }
            _ => Err(BugBridgeError::data(
                Service::Linear,
                "issueCreate reported failure",
            )),
        }
    }
}
