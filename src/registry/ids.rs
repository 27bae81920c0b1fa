//! Validated instance keys

use crate::{BugBridgeError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Key of a Sentry or Linear instance (e.g. "work", "personal")
///
/// Guaranteed non-empty and free of whitespace, so keys can be typed on the
/// command line and used as YAML map keys without quoting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceKey(String);

impl InstanceKey {
    /// Key given to instances synthesized from legacy single-instance settings
    pub const DEFAULT: &'static str = "default";

    /// Parse and validate a key
    pub fn parse(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(BugBridgeError::InvalidKey(
                "key must not be empty".to_string(),
            ));
        }
        if key.chars().any(char::is_whitespace) {
            return Err(BugBridgeError::InvalidKey(format!(
                "'{}' must not contain whitespace",
                key
            )));
        }
        Ok(Self(key))
    }

    /// The `default` key used by legacy migration
    pub fn default_key() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for InstanceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InstanceKey {
    type Error = BugBridgeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl FromStr for InstanceKey {
    type Err = BugBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<InstanceKey> for String {
    fn from(key: InstanceKey) -> Self {
        key.0
    }
}

impl PartialEq<str> for InstanceKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for InstanceKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
