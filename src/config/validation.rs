//! Configuration validation
//!
//! Validates bugbridge configuration for correctness:
//! - No duplicate connection names
//! - Connections reference instances that exist
//! - Each Sentry project is mapped at most once per connection
//! - URLs are http(s)

use super::bugbridge_config::BugBridgeConfig;
use crate::connections::Connection;
use crate::registry::{Instance, InstanceKind, Linear, Sentry};
use std::collections::HashSet;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Connection or instance the problem belongs to
    pub context: Option<String>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: None,
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref ctx) = self.context {
            write!(f, "[{}] {}: {}", ctx, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a bugbridge configuration, reporting every problem found
pub fn validate_config(config: &BugBridgeConfig) -> ValidationResult {
    let mut errors = Vec::new();

    validate_instances::<Sentry>(config, "sentry.instances", &mut errors);
    validate_instances::<Linear>(config, "linear.instances", &mut errors);

    // Check for duplicate connection names
    let mut seen_names = HashSet::new();
    for connection in &config.bug_manager.connections {
        if !seen_names.insert(connection.name.as_str()) {
            errors.push(ValidationError::new(
                "bug_manager.connections",
                format!("Duplicate connection name: {}", connection.name),
            ));
        }
    }

    for connection in &config.bug_manager.connections {
        if let Err(mut conn_errors) = validate_connection(config, connection) {
            errors.append(&mut conn_errors);
        }
    }

    if config.settings.issue_fetch_limit == 0 {
        errors.push(ValidationError::new(
            "settings.issue_fetch_limit",
            "Fetch limit must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_instances<K: InstanceKind>(
    config: &BugBridgeConfig,
    field: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (key, instance) in K::registry(config).iter() {
        if instance.api_key.is_empty() {
            tracing::warn!(kind = K::LABEL, key = %key, "Instance has no API key");
        }
        if let Some(message) = bad_base_url(instance) {
            errors.push(
                ValidationError::new(format!("{}.{}.base_url", field, key), message)
                    .with_context(format!("{} instance {}", K::LABEL, key)),
            );
        }
    }
}

fn bad_base_url(instance: &Instance) -> Option<String> {
    let url = instance.base_url.as_deref()?;
    if url.starts_with("http://") || url.starts_with("https://") {
        None
    } else {
        Some(format!("Invalid URL: {}", url))
    }
}

/// Validate a single connection
fn validate_connection(config: &BugBridgeConfig, connection: &Connection) -> ValidationResult {
    let mut errors = Vec::new();

    if connection.name.trim().is_empty() {
        errors.push(
            ValidationError::new("name", "Connection name cannot be empty")
                .with_context(&connection.name),
        );
    }

    if !Sentry::registry(config).contains(connection.sentry_instance.as_str()) {
        errors.push(
            ValidationError::new(
                "sentry_instance",
                format!(
                    "Sentry instance '{}' does not exist",
                    connection.sentry_instance
                ),
            )
            .with_context(&connection.name),
        );
    }

    if !Linear::registry(config).contains(connection.linear_instance.as_str()) {
        errors.push(
            ValidationError::new(
                "linear_instance",
                format!(
                    "Linear instance '{}' does not exist",
                    connection.linear_instance
                ),
            )
            .with_context(&connection.name),
        );
    }

    let mut seen_projects = HashSet::new();
    for (index, mapping) in connection.project_mappings.iter().enumerate() {
        let field = format!("project_mappings[{}]", index);

        if !seen_projects.insert((
            mapping.sentry_organization.as_str(),
            mapping.sentry_project.as_str(),
        )) {
            errors.push(
                ValidationError::new(
                    &field,
                    format!("Sentry project {} is mapped twice", mapping.source_path()),
                )
                .with_context(&connection.name),
            );
        }

        if mapping.sentry_organization.is_empty() || mapping.sentry_project.is_empty() {
            errors.push(
                ValidationError::new(&field, "Sentry organization and project are required")
                    .with_context(&connection.name),
            );
        }

        if mapping.linear_team_id.is_empty() {
            errors.push(
                ValidationError::new(&field, "Linear team id cannot be empty")
                    .with_context(&connection.name),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
