//! Integration tests for bugbridge
//!
//! These tests drive the full sync flow against in-memory Sentry and Linear
//! fakes, and the config lifecycle against real files.

use async_trait::async_trait;
use bugbridge::config::{BugBridgeConfig, ConfigHandle, MemoryConfigStore};
use bugbridge::connections::{Connection, ProjectMapping, ResolvedMapping};
use bugbridge::integrations::{
    ClientFactory, CreatedIssue, IssueDraft, LinearLabel, LinearProject, LinearTeam, Priority,
    SentryEvent, SentryIssue, SentryProject, SinkApi, SourceApi, WorkflowState,
};
use bugbridge::prompt::{Answer, ScriptedPrompter};
use bugbridge::registry::{Instance, InstanceKey, Linear, Sentry};
use bugbridge::sync::{self, SyncOptions, SyncOutcome, SyncRequest};
use bugbridge::{BugBridgeError, ErrorCategory, Result, Service};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// =============================================================================
// Fakes
// =============================================================================

/// In-memory Sentry project
#[derive(Clone, Default)]
struct FakeSource {
    issues: Vec<SentryIssue>,
    issues_fail: bool,
    detail_fails: bool,
    event_fails: bool,
    resolve_fails: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSource {
    fn with_issues(issues: Vec<SentryIssue>) -> Self {
        Self {
            issues,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SourceApi for FakeSource {
    async fn list_projects(&self) -> Result<Vec<SentryProject>> {
        self.record("list_projects".to_string());
        Ok(Vec::new())
    }

    async fn list_unresolved_issues(
        &self,
        org: &str,
        project: &str,
        limit: u32,
    ) -> Result<Vec<SentryIssue>> {
        self.record(format!("list_unresolved_issues {}/{} {}", org, project, limit));
        if self.issues_fail {
            return Err(BugBridgeError::source_unavailable("issue list timed out"));
        }
        Ok(self.issues.iter().take(limit as usize).cloned().collect())
    }

    async fn get_issue(&self, issue_id: &str) -> Result<SentryIssue> {
        self.record(format!("get_issue {}", issue_id));
        if self.detail_fails {
            return Err(BugBridgeError::source_unavailable("issue endpoint down"));
        }
        self.issues
            .iter()
            .find(|i| i.id == issue_id)
            .cloned()
            .ok_or_else(|| BugBridgeError::data(Service::Sentry, "no such issue"))
    }

    async fn latest_event(&self, issue_id: &str) -> Result<SentryEvent> {
        self.record(format!("latest_event {}", issue_id));
        if self.event_fails {
            return Err(BugBridgeError::source_unavailable("event endpoint down"));
        }
        Ok(SentryEvent::default())
    }

    async fn resolve_issue(&self, issue_id: &str) -> Result<()> {
        self.record(format!("resolve_issue {}", issue_id));
        if self.resolve_fails {
            return Err(BugBridgeError::source_unavailable("resolve rejected"));
        }
        Ok(())
    }
}

/// In-memory Linear workspace
#[derive(Clone, Default)]
struct FakeSink {
    states: Vec<WorkflowState>,
    states_fail: bool,
    create_fails: bool,
    /// Labels whose creation fails
    broken_labels: Vec<String>,
    labels: Arc<Mutex<HashMap<(String, String), LinearLabel>>>,
    created: Arc<Mutex<Vec<(IssueDraft, Vec<String>)>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSink {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn created(&self) -> Vec<(IssueDraft, Vec<String>)> {
        self.created.lock().unwrap().clone()
    }

    fn creations(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SinkApi for FakeSink {
    async fn list_teams(&self) -> Result<Vec<LinearTeam>> {
        self.record("list_teams".to_string());
        Ok(vec![LinearTeam {
            id: "T1".to_string(),
            name: "Backend".to_string(),
            key: "BE".to_string(),
        }])
    }

    async fn list_projects(&self, team_id: &str) -> Result<Vec<LinearProject>> {
        self.record(format!("list_projects {}", team_id));
        Ok(Vec::new())
    }

    async fn list_workflow_states(&self, team_id: &str) -> Result<Vec<WorkflowState>> {
        self.record(format!("list_workflow_states {}", team_id));
        if self.states_fail {
            return Err(BugBridgeError::sink_unavailable("states unavailable"));
        }
        Ok(self.states.clone())
    }

    async fn find_label(&self, team_id: &str, name: &str) -> Result<Option<LinearLabel>> {
        self.record(format!("find_label {}", name));
        let labels = self.labels.lock().unwrap();
        Ok(labels
            .get(&(team_id.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_label(&self, team_id: &str, name: &str, color: &str) -> Result<LinearLabel> {
        self.record(format!("create_label {}", name));
        if self.broken_labels.iter().any(|l| l == name) {
            return Err(BugBridgeError::data(Service::Linear, "label rejected"));
        }
        let mut labels = self.labels.lock().unwrap();
        let label = LinearLabel {
            id: format!("label-{}", labels.len() + 1),
            name: name.to_string(),
            color: Some(color.to_string()),
        };
        labels.insert((team_id.to_string(), name.to_string()), label.clone());
        Ok(label)
    }

    async fn create_issue(&self, draft: &IssueDraft, label_ids: &[String]) -> Result<CreatedIssue> {
        self.record("create_issue".to_string());
        if self.create_fails {
            return Err(BugBridgeError::sink_unavailable("issueCreate failed"));
        }
        self.created
            .lock()
            .unwrap()
            .push((draft.clone(), label_ids.to_vec()));
        Ok(CreatedIssue {
            id: "issue-1".to_string(),
            identifier: "BE-7".to_string(),
            title: draft.title.clone(),
            url: "https://linear.app/acme/issue/BE-7".to_string(),
            priority: draft.priority,
            state: None,
            labels: Vec::new(),
        })
    }
}

struct FakeFactory {
    source: FakeSource,
    sink: FakeSink,
}

impl ClientFactory for FakeFactory {
    fn source(&self, _instance: &Instance) -> Result<Box<dyn SourceApi>> {
        Ok(Box::new(self.source.clone()))
    }

    fn sink(&self, _instance: &Instance) -> Result<Box<dyn SinkApi>> {
        Ok(Box::new(self.sink.clone()))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn key(k: &str) -> InstanceKey {
    InstanceKey::parse(k).unwrap()
}

fn null_pointer_issue() -> SentryIssue {
    SentryIssue {
        id: "4711".to_string(),
        short_id: "ABC-1".to_string(),
        title: "NullPointer".to_string(),
        culprit: "app.handlers.save".to_string(),
        permalink: "https://sentry.io/organizations/acme/issues/4711/".to_string(),
        count: 310,
        user_count: 75,
        level: "error".to_string(),
        platform: "java".to_string(),
        ..Default::default()
    }
}

fn config() -> BugBridgeConfig {
    let mut config = BugBridgeConfig::new();
    config
        .sentry
        .instances
        .insert(key("default"), Instance::new("Acme Sentry", "sntrys_x"))
        .unwrap();
    config
        .linear
        .instances
        .insert(key("default"), Instance::new("Acme Linear", "lin_api_x"))
        .unwrap();

    let mut connection = Connection::new("main", key("default"), key("default"));
    connection
        .project_mappings
        .push(ProjectMapping::new("acme", "api", "T1").with_labels(["bug", "sentry"]));
    config.bug_manager.connections.push(connection);
    config
}

fn resolved() -> ResolvedMapping {
    bugbridge::connections::resolve(&config(), "main", 0).unwrap()
}

fn todo_state() -> WorkflowState {
    serde_json::from_value(serde_json::json!({
        "id": "state-todo",
        "name": "Todo",
        "type": "unstarted",
        "color": "#e2e2e2"
    }))
    .unwrap()
}

// =============================================================================
// Sync
// =============================================================================

mod sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_end_to_end_sync() {
        let source = FakeSource::with_issues(vec![null_pointer_issue()]);
        let sink = FakeSink {
            states: vec![todo_state()],
            ..Default::default()
        };
        let mut prompter = ScriptedPrompter::new([
            Answer::Select(0),      // issue
            Answer::Confirm(true),  // create
            Answer::Select(0),      // state
            Answer::Confirm(false), // resolve in Sentry
        ]);

        let outcome = sync::sync_one(
            &resolved(),
            &source,
            &sink,
            &mut prompter,
            &SyncOptions::default(),
        )
        .await
        .unwrap();

        let synced = outcome.created().expect("issue should be created");
        assert_eq!(synced.source_short_id, "ABC-1");
        assert_eq!(synced.issue.identifier, "BE-7");
        assert!(synced.skipped_labels.is_empty());
        assert!(!synced.resolved_in_source);

        let created = sink.created();
        assert_eq!(created.len(), 1);
        let (draft, label_ids) = &created[0];
        assert_eq!(draft.team_id, "T1");
        assert_eq!(draft.title, "[Sentry ABC-1] NullPointer");
        assert_eq!(draft.priority, Priority::High);
        assert_eq!(draft.priority.value(), 2);
        assert_eq!(draft.state_id.as_deref(), Some("state-todo"));
        for label in ["bug", "sentry", "level:error", "platform:java", "medium-impact"] {
            assert!(draft.label_names.iter().any(|l| l == label), "missing {}", label);
        }
        assert_eq!(label_ids.len(), draft.label_names.len());
        assert!(draft.description.contains("**Users Affected:** 75"));

        let preview = &prompter.previews[0];
        assert_eq!(preview.get("Priority"), Some("High"));
        assert_eq!(preview.get("Target"), Some("Team only"));

        assert_eq!(prompter.remaining(), 0);
        assert!(!source.calls().iter().any(|c| c.starts_with("resolve_issue")));
    }

    #[tokio::test]
    async fn test_declining_confirmation_makes_no_linear_calls() {
        let source = FakeSource::with_issues(vec![null_pointer_issue()]);
        let sink = FakeSink::default();
        let mut prompter = ScriptedPrompter::new([Answer::Select(0), Answer::Confirm(false)]);

        let err = sync::sync_one(
            &resolved(),
            &source,
            &sink,
            &mut prompter,
            &SyncOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_project_is_nothing_to_sync() {
        let source = FakeSource::default();
        let sink = FakeSink::default();
        let mut prompter = ScriptedPrompter::new([]);

        let outcome = sync::sync_one(
            &resolved(),
            &source,
            &sink,
            &mut prompter,
            &SyncOptions::new(5),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, SyncOutcome::NothingToSync));
        assert_eq!(source.calls(), vec!["list_unresolved_issues acme/api 5"]);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_paths_still_create_issue() {
        let source = FakeSource {
            event_fails: true,
            resolve_fails: true,
            ..FakeSource::with_issues(vec![null_pointer_issue()])
        };
        let sink = FakeSink {
            states_fail: true,
            broken_labels: vec!["platform:java".to_string()],
            ..Default::default()
        };
        let mut prompter = ScriptedPrompter::new([
            Answer::Select(0),
            Answer::Confirm(true),
            Answer::Confirm(true), // resolve in Sentry
        ]);

        let outcome = sync::sync_one(
            &resolved(),
            &source,
            &sink,
            &mut prompter,
            &SyncOptions::default(),
        )
        .await
        .unwrap();

        let synced = outcome.created().unwrap();
        assert_eq!(synced.skipped_labels, vec!["platform:java"]);
        assert!(!synced.resolved_in_source);
        assert!(synced.resolve_warning.is_some());

        let (draft, _) = &sink.created()[0];
        assert!(draft.state_id.is_none());
        assert!(!draft.label_names.iter().any(|l| l == "platform:java"));
        assert!(!draft.description.contains("## Stack Trace"));

        let warnings = prompter.warnings();
        assert!(warnings.iter().any(|w| w.starts_with("Could not fetch event details")));
        assert!(warnings.iter().any(|w| w.starts_with("Could not fetch workflow states")));
        assert!(warnings.iter().any(|w| w.contains("platform:java")));
        assert!(warnings.iter().any(|w| w.starts_with("Failed to mark issue as resolved")));
    }

    #[tokio::test]
    async fn test_escaping_state_picker_uses_team_default() {
        let source = FakeSource::with_issues(vec![null_pointer_issue()]);
        let sink = FakeSink {
            states: vec![todo_state()],
            ..Default::default()
        };
        let mut prompter = ScriptedPrompter::new([
            Answer::Select(0),
            Answer::Confirm(true),
            Answer::Escape,
            Answer::Confirm(true),
        ]);

        let outcome = sync::sync_one(
            &resolved(),
            &source,
            &sink,
            &mut prompter,
            &SyncOptions::default(),
        )
        .await
        .unwrap();

        assert!(outcome.created().unwrap().resolved_in_source);
        assert!(sink.created()[0].0.state_id.is_none());
        assert!(source.calls().contains(&"resolve_issue 4711".to_string()));
    }

    #[tokio::test]
    async fn test_session_repeats_with_same_mapping() {
        let factory = FakeFactory {
            source: FakeSource::with_issues(vec![null_pointer_issue()]),
            sink: FakeSink::default(),
        };
        let mut prompter = ScriptedPrompter::new([
            Answer::Select(0),
            Answer::Confirm(true),
            Answer::Confirm(false), // resolve
            Answer::Confirm(true),  // sync another
            Answer::Select(0),
            Answer::Confirm(false), // decline second create
        ]);

        let outcomes = sync::run_session(
            &config(),
            &factory,
            &mut prompter,
            &SyncRequest {
                limit: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(factory.sink.creations("create_issue"), 1);
        assert_eq!(
            factory
                .source
                .calls()
                .iter()
                .filter(|c| c.as_str() == "list_unresolved_issues acme/api 3")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_failed_required_reads_abort_before_linear() {
        for source in [
            FakeSource {
                issues_fail: true,
                ..FakeSource::with_issues(vec![null_pointer_issue()])
            },
            FakeSource {
                detail_fails: true,
                ..FakeSource::with_issues(vec![null_pointer_issue()])
            },
        ] {
            let sink = FakeSink::default();
            let mut prompter = ScriptedPrompter::new([Answer::Select(0), Answer::Confirm(true)]);

            let err = sync::sync_one(
                &resolved(),
                &source,
                &sink,
                &mut prompter,
                &SyncOptions::default(),
            )
            .await
            .unwrap_err();

            assert_eq!(err.category(), ErrorCategory::Transport);
            assert!(err.is_unavailable(Service::Sentry));
            assert!(sink.calls().is_empty());
            assert!(prompter.previews.is_empty());
        }
    }

    #[tokio::test]
    async fn test_failed_create_skips_resolve_prompt() {
        let source = FakeSource::with_issues(vec![null_pointer_issue()]);
        let sink = FakeSink {
            create_fails: true,
            ..Default::default()
        };
        let mut prompter = ScriptedPrompter::new([
            Answer::Select(0),
            Answer::Confirm(true),
            Answer::Confirm(true),
        ]);

        let err = sync::sync_one(
            &resolved(),
            &source,
            &sink,
            &mut prompter,
            &SyncOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(err.is_unavailable(Service::Linear));
        assert_eq!(prompter.asked, vec!["Select issue to sync", "Create this issue in Linear?"]);
        assert_eq!(prompter.remaining(), 1);
        assert!(!source.calls().iter().any(|c| c.starts_with("resolve_issue")));
    }

    #[tokio::test]
    async fn test_zero_fetch_limit_is_rejected() {
        let mut zero_setting = config();
        zero_setting.settings.issue_fetch_limit = 0;

        let cases = [
            (zero_setting, SyncRequest::default()),
            (
                config(),
                SyncRequest {
                    limit: Some(0),
                    ..Default::default()
                },
            ),
        ];
        for (config, request) in cases {
            let factory = FakeFactory {
                source: FakeSource::with_issues(vec![null_pointer_issue()]),
                sink: FakeSink::default(),
            };
            let mut prompter = ScriptedPrompter::new([]);

            let err = sync::run_session(&config, &factory, &mut prompter, &request)
                .await
                .unwrap_err();

            assert_eq!(err.category(), ErrorCategory::Config);
            assert!(factory.source.calls().is_empty());
            assert!(prompter.asked.is_empty());
        }
    }

    #[tokio::test]
    async fn test_prompt_failure_after_sync_keeps_outcomes() {
        let factory = FakeFactory {
            source: FakeSource::with_issues(vec![null_pointer_issue()]),
            sink: FakeSink::default(),
        };
        // No answer left for "Sync another issue", so that prompt errors
        let mut prompter = ScriptedPrompter::new([
            Answer::Select(0),
            Answer::Confirm(true),
            Answer::Confirm(false),
        ]);

        let request = SyncRequest::default();
        let outcomes = sync::run_session(&config(), &factory, &mut prompter, &request)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].created().unwrap().issue.identifier, "BE-7");
        assert_eq!(
            prompter.asked.last().map(String::as_str),
            Some("Sync another issue from the same project?")
        );
    }
}

// =============================================================================
// Labels
// =============================================================================

mod label_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_label_is_idempotent() {
        let sink = FakeSink::default();

        let first = sink.get_or_create_label("T1", "bug", "#e11d48").await.unwrap();
        let second = sink.get_or_create_label("T1", "bug", "#e11d48").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sink.creations("create_label"), 1);
    }

    #[tokio::test]
    async fn test_synced_labels_include_mapping_defaults() {
        let mut issue = null_pointer_issue();
        issue.user_count = 0;
        issue.platform = String::new();
        let details = sync::prepare_bug_details(&issue, None, resolved().default_labels());

        assert_eq!(&details.labels[..2], ["bug", "sentry"]);
        assert!(details.labels.contains(&"level:error".to_string()));
    }
}

// =============================================================================
// Priority
// =============================================================================

#[test]
fn test_priority_grows_with_impact() {
    assert_eq!(sync::calculate_priority("error", 10).value(), 2);
    assert!(sync::calculate_priority("error", 60).value() <= 2);
    assert_eq!(sync::calculate_priority("error", 150).value(), 1);
}

// =============================================================================
// Config lifecycle
// =============================================================================

mod config_tests {
    use super::*;

    const LEGACY: &str = r#"
sentry:
  api_key: sntrys_legacy
  projects:
    backend:
      organization_slug: acme
      project_slug: api
      linear_project_id: lp1
    worker:
      organization_slug: acme
      project_slug: worker
      linear_project_id: gone
linear:
  api_key: lin_legacy
  projects:
    lp1:
      team_id: T1
      project_id: P1
      project_name: Backend
      labels: [bug, sentry]
editor:
  theme: dark
"#;

    #[test]
    fn test_legacy_config_load_and_save() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, LEGACY).unwrap();

        let (handle, report) = ConfigHandle::open(&path).unwrap();
        assert!(report.sentry_instance_created);
        assert!(report.linear_instance_created);
        assert!(report.connection_created);
        assert_eq!(report.unmatched_projects, vec!["worker"]);

        let config = handle.config();
        let sentry = config.sentry.instances.get("default").unwrap();
        assert_eq!(sentry.name, "Default Sentry");
        assert_eq!(sentry.api_key, "sntrys_legacy");
        assert_eq!(sentry.endpoint::<Sentry>(), "https://sentry.io/api/0");
        assert_eq!(config.linear.instances.get("default").unwrap().api_key, "lin_legacy");

        assert_eq!(config.bug_manager.connections.len(), 1);
        let connection = &config.bug_manager.connections[0];
        assert_eq!(connection.name, "Default Connection");
        let mapping = connection.mapping("acme", "api").unwrap();
        assert_eq!(mapping.linear_team_id, "T1");
        assert_eq!(mapping.linear_project_id.as_deref(), Some("P1"));
        assert_eq!(mapping.default_labels, vec!["bug", "sentry"]);

        // Written back once, legacy fields and foreign sections intact
        let reloaded = BugBridgeConfig::load(&path).unwrap();
        assert_eq!(&reloaded, config);
        assert_eq!(reloaded.sentry.api_key, "sntrys_legacy");
        assert_eq!(reloaded.sentry.projects.len(), 2);
        assert!(reloaded.extra.contains_key("editor"));

        // Migrating again is a no-op
        let (_, report) = ConfigHandle::open(&path).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_missing_file_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.yaml");

        let (handle, _) = ConfigHandle::open(&path).unwrap();
        assert!(handle.connections().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_removing_referenced_instance_fails() {
        let mut handle = ConfigHandle::new(config(), MemoryConfigStore::new());

        let err = handle.remove_instance::<Linear>("default").unwrap_err();
        match err {
            BugBridgeError::InUse { connections, .. } => assert_eq!(connections, vec!["main"]),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(handle.store().save_count(), 0);

        handle.remove_connection("main").unwrap();
        handle.remove_instance::<Linear>("default").unwrap();
        assert_eq!(handle.store().save_count(), 2);
    }

    #[test]
    fn test_dangling_reference_reported() {
        let mut config = config();
        config.sentry.instances.remove("default");

        let errors = bugbridge::config::validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("default")));

        let err = bugbridge::connections::resolve(&config, "main", 0).unwrap_err();
        assert!(matches!(err, BugBridgeError::Referential(_)));
    }
}
