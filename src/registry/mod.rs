//! Instance registry
//!
//! Named Sentry and Linear instances, each with its own credential and
//! endpoint. Keys are unique within a kind; an instance cannot be removed
//! while a connection still references it.

mod ids;
mod instances;

pub use ids::InstanceKey;
pub use instances::{
    Instance, InstanceEdit, InstanceKind, InstanceRegistry, Linear, Sentry,
    DEFAULT_LINEAR_ENDPOINT, DEFAULT_SENTRY_BASE_URL,
};

use crate::config::{ConfigHandle, ConfigStore};
use crate::{BugBridgeError, Result};

impl<S: ConfigStore> ConfigHandle<S> {
    /// Register a new instance of kind `K` and persist
    pub fn add_instance<K: InstanceKind>(
        &mut self,
        key: InstanceKey,
        instance: Instance,
    ) -> Result<()> {
        tracing::debug!(kind = K::LABEL, key = %key, "Adding instance");
        K::registry_mut(self.config_mut()).insert(key, instance)?;
        self.persist()
    }

    /// Apply a partial edit to an existing instance and persist
    pub fn update_instance<K: InstanceKind>(
        &mut self,
        key: &str,
        edit: InstanceEdit,
    ) -> Result<()> {
        let instance = K::registry_mut(self.config_mut())
            .get_mut(key)
            .ok_or_else(|| not_found::<K>(key))?;
        edit.apply(instance);
        tracing::debug!(kind = K::LABEL, key = %key, "Updated instance");
        self.persist()
    }

    /// Remove an instance that no connection references, and persist
    pub fn remove_instance<K: InstanceKind>(&mut self, key: &str) -> Result<Instance> {
        if !K::registry(self.config()).contains(key) {
            return Err(not_found::<K>(key));
        }

        let users = self.connections_using::<K>(key);
        if !users.is_empty() {
            return Err(BugBridgeError::InUse {
                kind: K::LABEL,
                key: key.to_string(),
                connections: users,
            });
        }

        let removed = K::registry_mut(self.config_mut())
            .remove(key)
            .ok_or_else(|| not_found::<K>(key))?;
        tracing::info!(kind = K::LABEL, key = %key, "Removed instance");
        self.persist()?;
        Ok(removed)
    }

    pub fn instance<K: InstanceKind>(&self, key: &str) -> Option<&Instance> {
        K::registry(self.config()).get(key)
    }

    /// All instances of kind `K`, ordered by key
    pub fn instances<K: InstanceKind>(&self) -> Vec<(&InstanceKey, &Instance)> {
        K::registry(self.config()).iter().collect()
    }

    /// Names of connections referencing the given instance
    pub fn connections_using<K: InstanceKind>(&self, key: &str) -> Vec<String> {
        self.config()
            .bug_manager
            .connections
            .iter()
            .filter(|c| K::referenced_by(c) == key)
            .map(|c| c.name.clone())
            .collect()
    }
}

fn not_found<K: InstanceKind>(key: &str) -> BugBridgeError {
    BugBridgeError::NotFound(format!("{} instance '{}'", K::LABEL, key))
}
