//! bugbridge configuration file handling
//!
//! Loads and manages the ~/.config/bugbridge/config.yaml file. The document
//! may be shared with other tools, so sections bugbridge does not own are
//! carried through load and save untouched.

use super::migration::{self, MigrationReport};
use super::serde_ext::null_as_default;
use crate::connections::Connection;
use crate::registry::{InstanceRegistry, Linear, Sentry, DEFAULT_SENTRY_BASE_URL};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Legacy single-instance Sentry project entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacySentryProject {
    #[serde(default)]
    pub organization_slug: String,

    #[serde(default)]
    pub project_slug: String,

    /// Key into `linear.projects`
    #[serde(default)]
    pub linear_project_id: String,
}

/// Legacy single-instance Linear project entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyLinearProject {
    #[serde(default)]
    pub team_id: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub project_name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
}

/// `sentry:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentrySection {
    /// Legacy credential, superseded by `instances`
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_key: String,

    /// Legacy API root, superseded by `instances`
    #[serde(default = "default_sentry_base_url", deserialize_with = "null_as_default")]
    pub base_url: String,

    /// Legacy project table
    #[serde(default, deserialize_with = "null_as_default")]
    pub projects: BTreeMap<String, LegacySentryProject>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub instances: InstanceRegistry<Sentry>,
}

fn default_sentry_base_url() -> String {
    DEFAULT_SENTRY_BASE_URL.to_string()
}

impl Default for SentrySection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_sentry_base_url(),
            projects: BTreeMap::new(),
            instances: InstanceRegistry::new(),
        }
    }
}

/// `linear:` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearSection {
    /// Legacy credential, superseded by `instances`
    #[serde(default, deserialize_with = "null_as_default")]
    pub api_key: String,

    /// Legacy project table, keyed by project id
    #[serde(default, deserialize_with = "null_as_default")]
    pub projects: BTreeMap<String, LegacyLinearProject>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub instances: InstanceRegistry<Linear>,
}

/// `bug_manager:` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BugManagerSection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub connections: Vec<Connection>,
}

/// `settings:` section
///
/// Other tools keep their own keys here too; those land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Unresolved issues fetched per sync
    #[serde(default = "default_issue_fetch_limit")]
    pub issue_fetch_limit: u32,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_issue_fetch_limit() -> u32 {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            issue_fetch_limit: default_issue_fetch_limit(),
            extra: BTreeMap::new(),
        }
    }
}

/// bugbridge configuration
///
/// Represents the complete config.yaml document: Sentry and Linear instance
/// registries, the legacy single-instance fields they replaced, and the
/// connections that link the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugBridgeConfig {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sentry: SentrySection,

    #[serde(default, deserialize_with = "null_as_default")]
    pub linear: LinearSection,

    #[serde(default, deserialize_with = "null_as_default")]
    pub bug_manager: BugManagerSection,

    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: Settings,

    /// Sections owned by other tools
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl BugBridgeConfig {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self {
            sentry: SentrySection::default(),
            linear: LinearSection::default(),
            bug_manager: BugManagerSection::default(),
            settings: Settings::default(),
            extra: BTreeMap::new(),
        }
    }

    /// Load configuration from a specific path, migrating legacy fields
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::load_with_report(path)?.0)
    }

    /// Load and migrate, returning what migration synthesized
    ///
    /// A missing file is created with the default document.
    pub fn load_with_report(path: impl AsRef<Path>) -> Result<(Self, MigrationReport)> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, creating default");
            let config = Self::new();
            config.save(path)?;
            return Ok((config, MigrationReport::default()));
        }

        tracing::info!(path = %path.display(), "Loading bugbridge configuration");

        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        let report = migration::migrate(&mut config);

        if !report.is_empty() {
            tracing::info!(
                sentry_default = report.sentry_instance_created,
                linear_default = report.linear_instance_created,
                mappings = report.mappings_created,
                "Migrated legacy configuration"
            );
        }

        tracing::debug!(
            sentry_instances = config.sentry.instances.len(),
            linear_instances = config.linear.instances.len(),
            connections = config.bug_manager.connections.len(),
            "Configuration loaded successfully"
        );

        Ok((config, report))
    }

    /// Parse a document without migrating it
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Save configuration to a specific path
    ///
    /// Written to a sibling temp file first and renamed into place, so a
    /// crash never leaves a half-written document. The file holds API keys
    /// and is created owner-readable only.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        tracing::debug!(path = %path.display(), "Saving bugbridge configuration");

        let yaml = serde_yaml::to_string(self)?;
        let mut file = tempfile::NamedTempFile::new_in(&parent)?;
        file.write_all(yaml.as_bytes())?;
        file.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600))?;
        }

        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Get the default config path (~/.config/bugbridge/config.yaml)
    pub fn default_path() -> PathBuf {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("bugbridge");
        path.push("config.yaml");
        path
    }

    /// Get a connection by name
    pub fn get_connection(&self, name: &str) -> Option<&Connection> {
        self.bug_manager.connections.iter().find(|c| c.name == name)
    }

    /// Get a mutable reference to a connection by name
    pub fn get_connection_mut(&mut self, name: &str) -> Option<&mut Connection> {
        self.bug_manager
            .connections
            .iter_mut()
            .find(|c| c.name == name)
    }
}

impl Default for BugBridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Instance, InstanceKey};
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_config_creation() {
        let config = BugBridgeConfig::new();
        assert!(config.sentry.instances.is_empty());
        assert!(config.bug_manager.connections.is_empty());
        assert_eq!(config.sentry.base_url, "https://sentry.io/api/0");
        assert_eq!(config.settings.issue_fetch_limit, 20);
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = BugBridgeConfig::new();
        config
            .linear
            .instances
            .insert(
                InstanceKey::parse("work").unwrap(),
                Instance::new("Work", "lin_api_x"),
            )
            .unwrap();
        config.save(path).unwrap();

        let loaded = BugBridgeConfig::load(path).unwrap();
        assert_eq!(loaded.linear.instances.len(), 1);
        assert_eq!(loaded.linear.instances.get("work").unwrap().name, "Work");
    }

    #[test]
    fn test_load_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let config = BugBridgeConfig::load(&path).unwrap();
        assert_eq!(config, BugBridgeConfig::new());
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        BugBridgeConfig::new().save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_default_path() {
        let path = BugBridgeConfig::default_path();
        assert!(path.ends_with("bugbridge/config.yaml"));
    }

    #[test]
    fn test_null_sections_load_as_empty() {
        let yaml = "sentry:\n  instances: null\n  projects: null\nlinear: null\n\
                    bug_manager:\n  connections: null\n";
        let config = BugBridgeConfig::from_yaml(yaml).unwrap();
        assert!(config.sentry.instances.is_empty());
        assert!(config.linear.instances.is_empty());
        assert!(config.bug_manager.connections.is_empty());
    }

    #[test]
    fn test_foreign_sections_survive_round_trip() {
        let yaml = r#"
github:
  username: octocat
  token: ghp_x
settings:
  preferred_signing_method: ssh
sentry:
  instances: {}
"#;
        let config = BugBridgeConfig::from_yaml(yaml).unwrap();
        assert!(config.extra.contains_key("github"));
        assert_eq!(config.settings.issue_fetch_limit, 20);

        let out = serde_yaml::to_string(&config).unwrap();
        assert!(out.contains("username: octocat"));
        assert!(out.contains("preferred_signing_method: ssh"));
        assert!(out.contains("issue_fetch_limit: 20"));
    }

    #[test]
    fn test_empty_file_is_default_document() {
        let config = BugBridgeConfig::from_yaml("").unwrap();
        assert_eq!(config, BugBridgeConfig::new());
    }
}
