//! Instance definitions and the per-kind registry

use super::ids::InstanceKey;
use crate::config::{serde_ext, BugBridgeConfig};
use crate::connections::Connection;
use crate::{BugBridgeError, Result, Service};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

/// Default Sentry REST API root
pub const DEFAULT_SENTRY_BASE_URL: &str = "https://sentry.io/api/0";

/// Default Linear GraphQL endpoint
pub const DEFAULT_LINEAR_ENDPOINT: &str = "https://api.linear.app/graphql";

/// A named, credentialed endpoint of one external system
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Display name shown in pickers
    pub name: String,

    /// API credential
    #[serde(default)]
    pub api_key: String,

    /// API root override
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "serde_ext::empty_string_as_none"
    )]
    pub base_url: Option<String>,
}

impl Instance {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = if base_url.trim().is_empty() {
            None
        } else {
            Some(base_url)
        };
        self
    }

    /// Base URL to talk to, falling back to the kind's public endpoint
    pub fn endpoint<K: InstanceKind>(&self) -> &str {
        self.base_url.as_deref().unwrap_or(K::DEFAULT_BASE_URL)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Partial update applied by `update_instance`
#[derive(Debug, Clone, Default)]
pub struct InstanceEdit {
    pub name: Option<String>,
    pub api_key: Option<String>,
    /// `Some("")` clears the override
    pub base_url: Option<String>,
}

impl InstanceEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.api_key.is_none() && self.base_url.is_none()
    }

    pub(crate) fn apply(self, instance: &mut Instance) {
        if let Some(name) = self.name {
            instance.name = name;
        }
        if let Some(api_key) = self.api_key {
            instance.api_key = api_key;
        }
        if let Some(base_url) = self.base_url {
            instance.base_url = if base_url.trim().is_empty() {
                None
            } else {
                Some(base_url)
            };
        }
    }
}

/// Which external system an instance belongs to
///
/// Implemented by the zero-sized markers [`Sentry`] and [`Linear`]; lets the
/// registry operations be written once for both kinds.
pub trait InstanceKind: fmt::Debug + Clone + Copy + PartialEq + Send + Sync + 'static {
    /// Human label used in messages ("Sentry", "Linear")
    const LABEL: &'static str;

    const SERVICE: Service;

    const DEFAULT_BASE_URL: &'static str;

    fn registry(config: &BugBridgeConfig) -> &InstanceRegistry<Self>;

    fn registry_mut(config: &mut BugBridgeConfig) -> &mut InstanceRegistry<Self>;

    /// The key a connection holds for this kind
    fn referenced_by(connection: &Connection) -> &InstanceKey;
}

/// Marker for Sentry (source) instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentry;

/// Marker for Linear (sink) instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear;

impl InstanceKind for Sentry {
    const LABEL: &'static str = "Sentry";
    const SERVICE: Service = Service::Sentry;
    const DEFAULT_BASE_URL: &'static str = DEFAULT_SENTRY_BASE_URL;

    fn registry(config: &BugBridgeConfig) -> &InstanceRegistry<Self> {
        &config.sentry.instances
    }

    fn registry_mut(config: &mut BugBridgeConfig) -> &mut InstanceRegistry<Self> {
        &mut config.sentry.instances
    }

    fn referenced_by(connection: &Connection) -> &InstanceKey {
        &connection.sentry_instance
    }
}

impl InstanceKind for Linear {
    const LABEL: &'static str = "Linear";
    const SERVICE: Service = Service::Linear;
    const DEFAULT_BASE_URL: &'static str = DEFAULT_LINEAR_ENDPOINT;

    fn registry(config: &BugBridgeConfig) -> &InstanceRegistry<Self> {
        &config.linear.instances
    }

    fn registry_mut(config: &mut BugBridgeConfig) -> &mut InstanceRegistry<Self> {
        &mut config.linear.instances
    }

    fn referenced_by(connection: &Connection) -> &InstanceKey {
        &connection.linear_instance
    }
}

/// Keyed collection of instances of one kind, ordered by key
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent, bound(serialize = "", deserialize = ""))]
pub struct InstanceRegistry<K: InstanceKind> {
    entries: BTreeMap<InstanceKey, Instance>,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K: InstanceKind> InstanceRegistry<K> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            kind: PhantomData,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Instance> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Instance> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a new instance; an existing key is never overwritten
    pub fn insert(&mut self, key: InstanceKey, instance: Instance) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(BugBridgeError::DuplicateKey {
                kind: K::LABEL,
                key: key.to_string(),
            });
        }
        self.entries.insert(key, instance);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Instance> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstanceKey, &Instance)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &InstanceKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: InstanceKind> Default for InstanceRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: InstanceKind> fmt::Debug for InstanceRegistry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> InstanceKey {
        InstanceKey::parse(s).unwrap()
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut registry: InstanceRegistry<Sentry> = InstanceRegistry::new();
        registry
            .insert(key("work"), Instance::new("Work", "sk-1"))
            .unwrap();

        let err = registry
            .insert(key("work"), Instance::new("Other", "sk-2"))
            .unwrap_err();
        assert!(matches!(
            err,
            BugBridgeError::DuplicateKey { kind: "Sentry", .. }
        ));
        assert_eq!(registry.get("work").unwrap().api_key, "sk-1");
    }

    #[test]
    fn test_iteration_is_ordered_by_key() {
        let mut registry: InstanceRegistry<Linear> = InstanceRegistry::new();
        registry.insert(key("zeta"), Instance::new("Z", "k")).unwrap();
        registry.insert(key("alpha"), Instance::new("A", "k")).unwrap();

        let keys: Vec<&str> = registry.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let instance = Instance::new("Work", "super-secret");
        let debug = format!("{:?}", instance);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_endpoint_falls_back_to_kind_default() {
        let instance = Instance::new("Work", "k");
        assert_eq!(instance.endpoint::<Sentry>(), DEFAULT_SENTRY_BASE_URL);
        assert_eq!(instance.endpoint::<Linear>(), DEFAULT_LINEAR_ENDPOINT);

        let custom = instance.with_base_url("https://sentry.example.com/api/0");
        assert_eq!(
            custom.endpoint::<Sentry>(),
            "https://sentry.example.com/api/0"
        );
    }

    #[test]
    fn test_edit_clears_base_url() {
        let mut instance = Instance::new("Work", "k").with_base_url("https://x/api/0");
        InstanceEdit {
            name: Some("Renamed".to_string()),
            base_url: Some(String::new()),
            ..Default::default()
        }
        .apply(&mut instance);

        assert_eq!(instance.name, "Renamed");
        assert_eq!(instance.api_key, "k");
        assert!(instance.base_url.is_none());
    }

    #[test]
    fn test_registry_yaml_shape() {
        let yaml = "work:\n  name: Work\n  api_key: abc\n  base_url: ''\n";
        let registry: InstanceRegistry<Sentry> = serde_yaml::from_str(yaml).unwrap();
        let work = registry.get("work").unwrap();
        assert_eq!(work.name, "Work");
        assert!(work.base_url.is_none());

        let out = serde_yaml::to_string(&registry).unwrap();
        assert!(out.contains("work:"));
        assert!(!out.contains("base_url"));
    }
}
