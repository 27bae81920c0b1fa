//! Connection and mapping mutations
//!
//! Every operation validates first, applies, then persists. A failed
//! validation leaves both the document and the store untouched.

use super::model::{normalize_labels, Connection, ProjectMapping};
use crate::config::{ConfigHandle, ConfigStore};
use crate::registry::{InstanceKey, InstanceKind, Linear, Sentry};
use crate::{BugBridgeError, Result};
use std::collections::HashSet;

impl<S: ConfigStore> ConfigHandle<S> {
    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.config().get_connection(name)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.config().bug_manager.connections
    }

    /// Add a connection between existing instances
    pub fn add_connection(&mut self, connection: Connection) -> Result<()> {
        let name = connection.name.trim().to_string();
        if name.is_empty() {
            return Err(BugBridgeError::Config(
                "Connection name cannot be empty".to_string(),
            ));
        }
        if self.connection(&name).is_some() {
            return Err(BugBridgeError::DuplicateConnection(name));
        }
        self.require_instance::<Sentry>(&connection.sentry_instance)?;
        self.require_instance::<Linear>(&connection.linear_instance)?;

        let mut seen = HashSet::new();
        for mapping in &connection.project_mappings {
            if !seen.insert((&mapping.sentry_organization, &mapping.sentry_project)) {
                return Err(BugBridgeError::DuplicateMapping {
                    connection: name,
                    org: mapping.sentry_organization.clone(),
                    project: mapping.sentry_project.clone(),
                });
            }
        }

        let mut connection = connection;
        connection.name = name;
        tracing::info!(
            connection = %connection.name,
            sentry = %connection.sentry_instance,
            linear = %connection.linear_instance,
            "Adding connection"
        );
        self.config_mut().bug_manager.connections.push(connection);
        self.persist()
    }

    pub fn rename_connection(&mut self, name: &str, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(BugBridgeError::Config(
                "Connection name cannot be empty".to_string(),
            ));
        }
        if new_name != name && self.connection(new_name).is_some() {
            return Err(BugBridgeError::DuplicateConnection(new_name.to_string()));
        }

        self.connection_mut(name)?.name = new_name.to_string();
        tracing::info!(from = %name, to = %new_name, "Renamed connection");
        self.persist()
    }

    /// Point a connection at different instances; `None` keeps the current one
    pub fn set_connection_instances(
        &mut self,
        name: &str,
        sentry: Option<InstanceKey>,
        linear: Option<InstanceKey>,
    ) -> Result<()> {
        if self.connection(name).is_none() {
            return Err(connection_not_found(name));
        }
        if let Some(ref key) = sentry {
            self.require_instance::<Sentry>(key)?;
        }
        if let Some(ref key) = linear {
            self.require_instance::<Linear>(key)?;
        }

        let connection = self.connection_mut(name)?;
        if let Some(key) = sentry {
            connection.sentry_instance = key;
        }
        if let Some(key) = linear {
            connection.linear_instance = key;
        }
        self.persist()
    }

    pub fn remove_connection(&mut self, name: &str) -> Result<Connection> {
        let connections = &mut self.config_mut().bug_manager.connections;
        let index = connections
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| connection_not_found(name))?;
        let removed = connections.remove(index);
        tracing::info!(connection = %name, "Removed connection");
        self.persist()?;
        Ok(removed)
    }

    /// Add a project mapping; each Sentry project maps once per connection
    pub fn add_mapping(&mut self, connection_name: &str, mapping: ProjectMapping) -> Result<()> {
        if mapping.linear_team_id.trim().is_empty() {
            return Err(BugBridgeError::Config(
                "Linear team id cannot be empty".to_string(),
            ));
        }

        let connection = self.connection_mut(connection_name)?;
        if connection
            .mapping_index(&mapping.sentry_organization, &mapping.sentry_project)
            .is_some()
        {
            return Err(BugBridgeError::DuplicateMapping {
                connection: connection_name.to_string(),
                org: mapping.sentry_organization,
                project: mapping.sentry_project,
            });
        }

        tracing::info!(
            connection = %connection_name,
            project = %mapping.source_path(),
            team = %mapping.linear_team_id,
            "Adding project mapping"
        );
        connection.project_mappings.push(mapping);
        self.persist()
    }

    pub fn set_mapping_labels(
        &mut self,
        connection_name: &str,
        organization: &str,
        project: &str,
        labels: Vec<String>,
    ) -> Result<()> {
        let mapping = self.mapping_mut(connection_name, organization, project)?;
        mapping.default_labels = normalize_labels(labels);
        self.persist()
    }

    pub fn remove_mapping(
        &mut self,
        connection_name: &str,
        organization: &str,
        project: &str,
    ) -> Result<ProjectMapping> {
        let connection = self.connection_mut(connection_name)?;
        let index = connection
            .mapping_index(organization, project)
            .ok_or_else(|| mapping_not_found(connection_name, organization, project))?;
        let removed = connection.project_mappings.remove(index);
        self.persist()?;
        Ok(removed)
    }

    fn connection_mut(&mut self, name: &str) -> Result<&mut Connection> {
        self.config_mut()
            .get_connection_mut(name)
            .ok_or_else(|| connection_not_found(name))
    }

    fn mapping_mut(
        &mut self,
        connection_name: &str,
        organization: &str,
        project: &str,
    ) -> Result<&mut ProjectMapping> {
        let connection = self.connection_mut(connection_name)?;
        let index = connection
            .mapping_index(organization, project)
            .ok_or_else(|| mapping_not_found(connection_name, organization, project))?;
        Ok(&mut connection.project_mappings[index])
    }

    fn require_instance<K: InstanceKind>(&self, key: &InstanceKey) -> Result<()> {
        if K::registry(self.config()).contains(key.as_str()) {
            Ok(())
        } else {
            Err(BugBridgeError::Referential(format!(
                "{} instance '{}' does not exist",
                K::LABEL,
                key
            )))
        }
    }
}

fn connection_not_found(name: &str) -> BugBridgeError {
    BugBridgeError::NotFound(format!("connection '{}'", name))
}

fn mapping_not_found(connection: &str, organization: &str, project: &str) -> BugBridgeError {
    BugBridgeError::NotFound(format!(
        "mapping for {}/{} in connection '{}'",
        organization, project, connection
    ))
}
