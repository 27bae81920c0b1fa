//! Sentry Integration Adapter
//!
//! Read-mostly access to a Sentry instance over its REST API: projects,
//! unresolved issues, the latest event of an issue, and resolving issues.

use crate::config::serde_ext::null_as_default;
use crate::registry::{Instance, Sentry};
use crate::{BugBridgeError, Result, Service};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for every Sentry call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source-side operations the sync needs
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Every project the credential can see
    async fn list_projects(&self) -> Result<Vec<SentryProject>>;

    /// Most recent unresolved issues of a project, newest first
    async fn list_unresolved_issues(
        &self,
        organization: &str,
        project: &str,
        limit: u32,
    ) -> Result<Vec<SentryIssue>>;

    async fn get_issue(&self, issue_id: &str) -> Result<SentryIssue>;

    async fn latest_event(&self, issue_id: &str) -> Result<SentryEvent>;

    /// Mark an issue resolved; resolving twice is harmless
    async fn resolve_issue(&self, issue_id: &str) -> Result<()>;
}

/// Sentry project as returned by `GET /projects/`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryProject {
    #[serde(default)]
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub organization: Option<SentryOrganization>,
    /// Older API versions send the slug flat
    #[serde(default, deserialize_with = "null_as_default")]
    pub organization_slug: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryOrganization {
    #[serde(default)]
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

/// Sentry issue (a group of events)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentryIssue {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub short_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub culprit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub permalink: String,
    /// Total events; the API sends this as a string
    #[serde(default, deserialize_with = "count_from_string_or_number")]
    pub count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_count: u64,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub level: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub platform: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub project: Option<SentryIssueProject>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryIssueProject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

impl SentryIssue {
    /// Metadata entry rendered as text; `None` when absent or blank
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Metadata entry as a positive integer
    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        let value = match self.metadata.get(key)? {
            serde_json::Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        };
        value.filter(|n| *n > 0)
    }
}

/// Latest event of an issue, used for the stack trace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryEvent {
    #[serde(default, rename = "eventID", deserialize_with = "null_as_default")]
    pub event_id: String,
    #[serde(default)]
    pub exception: Option<ExceptionInterface>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entries: Vec<EventEntry>,
}

/// One interface entry of an event (`exception`, `breadcrumbs`, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventEntry {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExceptionInterface {
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<ExceptionValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExceptionValue {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(default)]
    pub stacktrace: Option<Stacktrace>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stacktrace {
    #[serde(default, deserialize_with = "null_as_default")]
    pub frames: Vec<Frame>,
}

/// Stack frame, oldest call first as Sentry sends them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub function: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub module: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub line_no: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub col_no: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub abs_path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub in_app: bool,
}

impl ExceptionValue {
    pub fn frames(&self) -> &[Frame] {
        self.stacktrace
            .as_ref()
            .map(|s| s.frames.as_slice())
            .unwrap_or_default()
    }
}

impl SentryEvent {
    /// Exceptions of the event
    ///
    /// The issue-events endpoint nests them in an `exception` entry; the flat
    /// `exception` field is used when present.
    pub fn exceptions(&self) -> Vec<ExceptionValue> {
        if let Some(ref exception) = self.exception {
            if !exception.values.is_empty() {
                return exception.values.clone();
            }
        }

        self.entries
            .iter()
            .filter(|e| e.kind == "exception")
            .filter_map(|e| serde_json::from_value::<ExceptionInterface>(e.data.clone()).ok())
            .flat_map(|i| i.values)
            .collect()
    }
}

fn count_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        Some(Count::Number(n)) => Ok(n),
        Some(Count::Text(s)) => s.trim().parse().map_err(serde::de::Error::custom),
        None => Ok(0),
    }
}

/// Sentry REST client for one instance
pub struct SentryClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SentryClient {
    /// Create a client for a registered Sentry instance
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(instance: &Instance) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("bugbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BugBridgeError::from_http(Service::Sentry, e))?;

        Ok(Self {
            client,
            base_url: instance.endpoint::<Sentry>().trim_end_matches('/').to_string(),
            api_key: instance.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(|e| BugBridgeError::from_http(Service::Sentry, e))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| BugBridgeError::from_http(Service::Sentry, e)),
            status => Err(status_error(status, what, response.text().await.unwrap_or_default())),
        }
    }
}

/// Map a non-success status onto transport or data errors
fn status_error(status: StatusCode, what: &str, body: String) -> BugBridgeError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BugBridgeError::source_unavailable(
            format!("authentication failed while fetching {} (HTTP {})", what, status),
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            BugBridgeError::source_unavailable(format!("rate limited while fetching {}", what))
        }
        s if s.is_server_error() => BugBridgeError::source_unavailable(format!(
            "HTTP {} while fetching {}: {}",
            s, what, body
        )),
        s => BugBridgeError::data(
            Service::Sentry,
            format!("HTTP {} while fetching {}: {}", s, what, body),
        ),
    }
}

#[async_trait]
impl SourceApi for SentryClient {
    async fn list_projects(&self) -> Result<Vec<SentryProject>> {
        let url = format!("{}/projects/", self.base_url);
        debug!(url = %url, "Fetching Sentry projects");

        let mut projects: Vec<SentryProject> = self.get_json(&url, "projects").await?;
        for project in &mut projects {
            if project.organization_slug.is_empty() {
                if let Some(ref org) = project.organization {
                    project.organization_slug = org.slug.clone();
                }
            }
        }

        info!(count = projects.len(), "Sentry projects fetched");
        Ok(projects)
    }

    async fn list_unresolved_issues(
        &self,
        organization: &str,
        project: &str,
        limit: u32,
    ) -> Result<Vec<SentryIssue>> {
        let url = format!(
            "{}/projects/{}/{}/issues/?query={}&limit={}&sort=date&statsPeriod=24h",
            self.base_url,
            urlencoding::encode(organization),
            urlencoding::encode(project),
            urlencoding::encode("is:unresolved"),
            limit
        );
        debug!(
            organization = %organization,
            project = %project,
            limit,
            "Fetching unresolved Sentry issues"
        );

        let issues: Vec<SentryIssue> = self.get_json(&url, "issues").await?;
        info!(count = issues.len(), "Sentry issues fetched");
        Ok(issues)
    }

    async fn get_issue(&self, issue_id: &str) -> Result<SentryIssue> {
        let url = format!("{}/issues/{}/", self.base_url, urlencoding::encode(issue_id));
        debug!(issue = %issue_id, "Fetching Sentry issue");
        self.get_json(&url, "issue details").await
    }

    async fn latest_event(&self, issue_id: &str) -> Result<SentryEvent> {
        let url = format!(
            "{}/issues/{}/events/latest/",
            self.base_url,
            urlencoding::encode(issue_id)
        );
        debug!(issue = %issue_id, "Fetching latest Sentry event");
        self.get_json(&url, "latest event").await
    }

    async fn resolve_issue(&self, issue_id: &str) -> Result<()> {
        let url = format!("{}/issues/{}/", self.base_url, urlencoding::encode(issue_id));
        debug!(issue = %issue_id, "Resolving Sentry issue");

        let response = self
            .authorized(self.client.put(&url))
            .json(&serde_json::json!({ "status": "resolved" }))
            .send()
            .await
            .map_err(|e| BugBridgeError::from_http(Service::Sentry, e))?;

        match response.status() {
            status if status.is_success() => {
                info!(issue = %issue_id, "Sentry issue resolved");
                Ok(())
            }
            status => Err(status_error(
                status,
                "issue resolution",
                response.text().await.unwrap_or_default(),
            )),
        }
    }
}
