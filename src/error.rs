//! Error types for bugbridge
//!
//! One error enum covers every failure mode of the bridge. Variants group into
//! four families that callers branch on:
//!
//! - **Config**: duplicate keys, in-use deletion, dangling references
//! - **Transport**: network, timeout, or authentication failures against Sentry/Linear
//! - **Data**: malformed or unexpected API responses
//! - **Cancelled**: the user declined at a prompt or confirmation gate
//!
//! Uses thiserror for ergonomic error handling.

use std::fmt;
use thiserror::Error;

/// Result type alias for bugbridge operations
pub type Result<T> = std::result::Result<T, BugBridgeError>;

/// The external system an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Sentry,
    Linear,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Sentry => write!(f, "Sentry"),
            Service::Linear => write!(f, "Linear"),
        }
    }
}

/// Coarse error family, used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Transport,
    Data,
    Cancelled,
    Internal,
}

/// Error type for bugbridge operations
#[derive(Error, Debug)]
pub enum BugBridgeError {
    /// Generic configuration errors (missing file, bad value)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Instance key rejected by validation
    #[error("Invalid instance key: {0}")]
    InvalidKey(String),

    /// An instance with this key already exists for its kind
    #[error("{kind} instance with key '{key}' already exists")]
    DuplicateKey { kind: &'static str, key: String },

    /// A connection with this name already exists
    #[error("Connection with name '{0}' already exists")]
    DuplicateConnection(String),

    /// The Sentry project is already mapped in this connection
    #[error("Sentry project {org}/{project} is already mapped in connection '{connection}'")]
    DuplicateMapping {
        connection: String,
        org: String,
        project: String,
    },

    /// Instance is still referenced by one or more connections
    #[error(
        "Cannot remove {kind} instance '{key}': it is used by connection(s) {}",
        .connections.join(", ")
    )]
    InUse {
        kind: &'static str,
        key: String,
        connections: Vec<String>,
    },

    /// A connection references an instance that no longer exists
    #[error("Referential error: {0}")]
    Referential(String),

    /// Named entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network, timeout, or authentication failure
    #[error("{service} unavailable: {message}")]
    Transport { service: Service, message: String },

    /// Malformed or unexpected API response
    #[error("Unexpected {service} response: {message}")]
    Data { service: Service, message: String },

    /// User declined at a prompt or confirmation gate
    #[error("Cancelled")]
    UserCancelled,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Terminal prompt errors
    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl BugBridgeError {
    /// Transport failure against Sentry (a required source read failed)
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::Transport {
            service: Service::Sentry,
            message: message.into(),
        }
    }

    /// Transport failure against Linear
    pub fn sink_unavailable(message: impl Into<String>) -> Self {
        Self::Transport {
            service: Service::Linear,
            message: message.into(),
        }
    }

    pub fn data(service: Service, message: impl Into<String>) -> Self {
        Self::Data {
            service,
            message: message.into(),
        }
    }

    /// Map a reqwest failure onto the transport/data split.
    ///
    /// Decode failures mean the service answered with something we could not
    /// read; everything else (connect, timeout, request building) is transport.
    pub fn from_http(service: Service, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::data(service, err.to_string())
        } else if err.is_timeout() {
            Self::Transport {
                service,
                message: format!("request timed out: {}", err),
            }
        } else {
            Self::Transport {
                service,
                message: err.to_string(),
            }
        }
    }

    /// Error family of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            BugBridgeError::Config(_)
            | BugBridgeError::InvalidKey(_)
            | BugBridgeError::DuplicateKey { .. }
            | BugBridgeError::DuplicateConnection(_)
            | BugBridgeError::DuplicateMapping { .. }
            | BugBridgeError::InUse { .. }
            | BugBridgeError::Referential(_)
            | BugBridgeError::NotFound(_)
            | BugBridgeError::Yaml(_) => ErrorCategory::Config,
            BugBridgeError::Transport { .. } => ErrorCategory::Transport,
            BugBridgeError::Data { .. } | BugBridgeError::Json(_) => ErrorCategory::Data,
            BugBridgeError::UserCancelled => ErrorCategory::Cancelled,
            BugBridgeError::Io(_) | BugBridgeError::Prompt(_) | BugBridgeError::Other(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BugBridgeError::UserCancelled)
    }

    /// True for transport failures against the given service
    pub fn is_unavailable(&self, target: Service) -> bool {
        matches!(self, BugBridgeError::Transport { service, .. } if *service == target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = BugBridgeError::InUse {
            kind: "Sentry",
            key: "work".to_string(),
            connections: vec!["main".to_string()],
        };
        assert_eq!(err.category(), ErrorCategory::Config);
        assert_eq!(
            BugBridgeError::source_unavailable("timeout").category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            BugBridgeError::data(Service::Linear, "no data").category(),
            ErrorCategory::Data
        );
        assert!(BugBridgeError::UserCancelled.is_cancelled());
    }

    #[test]
    fn test_in_use_message_lists_connections() {
        let err = BugBridgeError::InUse {
            kind: "Linear",
            key: "default".to_string(),
            connections: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot remove Linear instance 'default': it is used by connection(s) a, b"
        );
    }

    #[test]
    fn test_is_unavailable_checks_service() {
        let err = BugBridgeError::source_unavailable("connection refused");
        assert!(err.is_unavailable(Service::Sentry));
        assert!(!err.is_unavailable(Service::Linear));
        assert_eq!(err.to_string(), "Sentry unavailable: connection refused");
    }
}
