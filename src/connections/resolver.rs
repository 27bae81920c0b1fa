//! Mapping resolution
//!
//! Turns a (connection, mapping) selection into everything a sync needs:
//! both instances with their credentials plus the mapping's routing.

use super::model::ProjectMapping;
use crate::config::BugBridgeConfig;
use crate::registry::{Instance, InstanceKey, InstanceKind, Linear, Sentry};
use crate::{BugBridgeError, Result};

/// A project mapping with both of its instances looked up
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMapping {
    pub connection: String,
    pub sentry_key: InstanceKey,
    pub sentry: Instance,
    pub linear_key: InstanceKey,
    pub linear: Instance,
    pub mapping: ProjectMapping,
}

impl ResolvedMapping {
    pub fn sentry_organization(&self) -> &str {
        &self.mapping.sentry_organization
    }

    pub fn sentry_project(&self) -> &str {
        &self.mapping.sentry_project
    }

    pub fn linear_team_id(&self) -> &str {
        &self.mapping.linear_team_id
    }

    pub fn linear_project_id(&self) -> Option<&str> {
        self.mapping.linear_project_id.as_deref()
    }

    pub fn default_labels(&self) -> &[String] {
        &self.mapping.default_labels
    }
}

/// Resolve the mapping at `index` of the named connection
pub fn resolve(
    config: &BugBridgeConfig,
    connection: &str,
    index: usize,
) -> Result<ResolvedMapping> {
    let conn = config
        .get_connection(connection)
        .ok_or_else(|| BugBridgeError::NotFound(format!("connection '{}'", connection)))?;

    let mapping = conn.project_mappings.get(index).ok_or_else(|| {
        BugBridgeError::NotFound(format!(
            "mapping #{} in connection '{}'",
            index, connection
        ))
    })?;

    let sentry = lookup::<Sentry>(config, connection, &conn.sentry_instance)?;
    let linear = lookup::<Linear>(config, connection, &conn.linear_instance)?;

    tracing::debug!(
        connection = %connection,
        project = %mapping.source_path(),
        sentry = %conn.sentry_instance,
        linear = %conn.linear_instance,
        "Resolved mapping"
    );

    Ok(ResolvedMapping {
        connection: conn.name.clone(),
        sentry_key: conn.sentry_instance.clone(),
        sentry: sentry.clone(),
        linear_key: conn.linear_instance.clone(),
        linear: linear.clone(),
        mapping: mapping.clone(),
    })
}

/// Resolve by Sentry `org`/`project`
pub fn resolve_project(
    config: &BugBridgeConfig,
    connection: &str,
    organization: &str,
    project: &str,
) -> Result<ResolvedMapping> {
    let conn = config
        .get_connection(connection)
        .ok_or_else(|| BugBridgeError::NotFound(format!("connection '{}'", connection)))?;
    let index = conn.mapping_index(organization, project).ok_or_else(|| {
        BugBridgeError::NotFound(format!(
            "mapping for {}/{} in connection '{}'",
            organization, project, connection
        ))
    })?;
    resolve(config, connection, index)
}

fn lookup<'a, K: InstanceKind>(
    config: &'a BugBridgeConfig,
    connection: &str,
    key: &InstanceKey,
) -> Result<&'a Instance> {
    K::registry(config).get(key.as_str()).ok_or_else(|| {
        BugBridgeError::Referential(format!(
            "Connection '{}' references missing {} instance '{}'",
            connection,
            K::LABEL,
            key
        ))
    })
}
