//! Legacy configuration migration
//!
//! Older configs held exactly one Sentry key, one Linear key and a pair of
//! project tables joined by `linear_project_id`. Loading such a file
//! synthesizes `default` instances and a "Default Connection" from them.
//! Legacy fields are left in place, and every step is guarded by an
//! emptiness check so migrating twice changes nothing.

use super::bugbridge_config::BugBridgeConfig;
use crate::connections::{Connection, ProjectMapping};
use crate::registry::{Instance, InstanceKey, DEFAULT_SENTRY_BASE_URL};

/// Display name of the synthesized Sentry instance
pub const DEFAULT_SENTRY_NAME: &str = "Default Sentry";

/// Display name of the synthesized Linear instance
pub const DEFAULT_LINEAR_NAME: &str = "Default Linear";

/// Name of the connection synthesized from legacy project tables
pub const DEFAULT_CONNECTION_NAME: &str = "Default Connection";

/// What a migration pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Legacy `sentry.base_url` was blank and got the public default
    pub base_url_defaulted: bool,
    pub sentry_instance_created: bool,
    pub linear_instance_created: bool,
    pub connection_created: bool,
    /// Mappings placed in the synthesized connection
    pub mappings_created: usize,
    /// Legacy Sentry projects whose `linear_project_id` matched nothing
    pub unmatched_projects: Vec<String>,
}

impl MigrationReport {
    /// True when the document was left unchanged
    pub fn is_empty(&self) -> bool {
        !self.base_url_defaulted
            && !self.sentry_instance_created
            && !self.linear_instance_created
            && !self.connection_created
    }

    /// One line per change, for display
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.base_url_defaulted {
            lines.push(format!("Set sentry.base_url to {}", DEFAULT_SENTRY_BASE_URL));
        }
        if self.sentry_instance_created {
            lines.push("Created Sentry instance 'default' from sentry.api_key".to_string());
        }
        if self.linear_instance_created {
            lines.push("Created Linear instance 'default' from linear.api_key".to_string());
        }
        if self.connection_created {
            lines.push(format!(
                "Created connection '{}' with {} project mapping(s)",
                DEFAULT_CONNECTION_NAME, self.mappings_created
            ));
        }
        for project in &self.unmatched_projects {
            lines.push(format!(
                "Skipped legacy Sentry project '{}': no matching Linear project",
                project
            ));
        }
        lines
    }
}

/// Bring a loaded document up to the multi-instance layout
pub fn migrate(config: &mut BugBridgeConfig) -> MigrationReport {
    let mut report = MigrationReport::default();

    if config.sentry.base_url.trim().is_empty() {
        config.sentry.base_url = DEFAULT_SENTRY_BASE_URL.to_string();
        report.base_url_defaulted = true;
    }

    if !config.sentry.api_key.is_empty() && config.sentry.instances.is_empty() {
        let instance = Instance::new(DEFAULT_SENTRY_NAME, config.sentry.api_key.clone())
            .with_base_url(config.sentry.base_url.clone());
        // Registry is empty, so insert cannot collide
        if config
            .sentry
            .instances
            .insert(InstanceKey::default_key(), instance)
            .is_ok()
        {
            report.sentry_instance_created = true;
        }
    }

    if !config.linear.api_key.is_empty() && config.linear.instances.is_empty() {
        let instance = Instance::new(DEFAULT_LINEAR_NAME, config.linear.api_key.clone());
        if config
            .linear
            .instances
            .insert(InstanceKey::default_key(), instance)
            .is_ok()
        {
            report.linear_instance_created = true;
        }
    }

    if config.bug_manager.connections.is_empty() && !config.sentry.projects.is_empty() {
        let mut mappings = Vec::new();
        for (name, sentry_project) in &config.sentry.projects {
            match config.linear.projects.get(&sentry_project.linear_project_id) {
                Some(linear_project) => {
                    let mut mapping = ProjectMapping::new(
                        sentry_project.organization_slug.clone(),
                        sentry_project.project_slug.clone(),
                        linear_project.team_id.clone(),
                    )
                    .with_labels(linear_project.labels.iter().cloned());
                    mapping.set_project(
                        Some(linear_project.project_id.clone()),
                        linear_project.project_name.clone(),
                    );
                    mappings.push(mapping);
                }
                None => report.unmatched_projects.push(name.clone()),
            }
        }

        if !mappings.is_empty() {
            report.mappings_created = mappings.len();
            report.connection_created = true;
            let mut connection = Connection::new(
                DEFAULT_CONNECTION_NAME,
                InstanceKey::default_key(),
                InstanceKey::default_key(),
            );
            connection.project_mappings = mappings;
            config.bug_manager.connections.push(connection);
        }
    }

    report
}
