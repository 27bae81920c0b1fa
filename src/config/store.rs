//! Write-through configuration handle
//!
//! All mutations go through [`ConfigHandle`], which persists the whole
//! document to its [`ConfigStore`] right after each change.

use super::bugbridge_config::BugBridgeConfig;
use super::migration::MigrationReport;
use crate::Result;
use std::path::{Path, PathBuf};

/// Durable home for the configuration document
pub trait ConfigStore {
    fn persist(&mut self, config: &BugBridgeConfig) -> Result<()>;

    /// Where the document lives, for messages
    fn location(&self) -> String;
}

/// YAML file on disk
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn persist(&mut self, config: &BugBridgeConfig) -> Result<()> {
        config.save(&self.path)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store that keeps every persisted snapshot
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    snapshots: Vec<BugBridgeConfig>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn last(&self) -> Option<&BugBridgeConfig> {
        self.snapshots.last()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn persist(&mut self, config: &BugBridgeConfig) -> Result<()> {
        self.snapshots.push(config.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

/// Configuration document plus the store it writes through to
#[derive(Debug)]
pub struct ConfigHandle<S: ConfigStore> {
    config: BugBridgeConfig,
    store: S,
}

impl<S: ConfigStore> ConfigHandle<S> {
    pub fn new(config: BugBridgeConfig, store: S) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &BugBridgeConfig {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut BugBridgeConfig {
        &mut self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write the current document to the store
    pub fn persist(&mut self) -> Result<()> {
        tracing::trace!(location = %self.store.location(), "Persisting configuration");
        self.store.persist(&self.config)
    }
}

impl ConfigHandle<FileConfigStore> {
    /// Load (and migrate) the file at `path`
    ///
    /// When migration synthesized anything, the migrated document is written
    /// back once.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, MigrationReport)> {
        let store = FileConfigStore::new(path);
        let (config, report) = BugBridgeConfig::load_with_report(store.path())?;
        let mut handle = Self::new(config, store);
        if !report.is_empty() {
            handle.persist()?;
        }
        Ok((handle, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_records_snapshots() {
        let mut handle = ConfigHandle::new(BugBridgeConfig::new(), MemoryConfigStore::new());
        handle.config_mut().settings.issue_fetch_limit = 5;
        handle.persist().unwrap();

        assert_eq!(handle.store().save_count(), 1);
        assert_eq!(handle.store().last().unwrap().settings.issue_fetch_limit, 5);
    }

    #[test]
    fn test_open_persists_migrated_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sentry:\n  api_key: sk\n").unwrap();

        let (handle, report) = ConfigHandle::open(&path).unwrap();
        assert!(report.sentry_instance_created);
        assert!(handle.config().sentry.instances.contains("default"));

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("Default Sentry"));
        assert!(on_disk.contains("api_key: sk"));
    }
}
