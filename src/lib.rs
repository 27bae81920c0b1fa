//! bugbridge - Sentry to Linear issue sync
//!
//! bugbridge links Sentry instances to Linear workspaces and turns a chosen
//! Sentry error into a triaged Linear issue: markdown report, priority from
//! severity and user impact, labels, and optionally resolving the Sentry side.
//!
//! # Architecture
//!
//! - **registry**: Named Sentry/Linear instances with credentials
//! - **connections**: Connections between instances and their project mappings
//! - **config**: YAML document, legacy migration, validation, persistence
//! - **integrations**: Sentry REST and Linear GraphQL clients
//! - **sync**: Issue transform, the interactive sync and manual issue creation
//! - **prompt**: User interaction (terminal or scripted)

// Core modules
pub mod config;
pub mod connections;
pub mod error;
pub mod registry;

// Components
pub mod integrations;
pub mod logging;
pub mod prompt;
pub mod style;
pub mod sync;

// Re-exports
pub use error::{BugBridgeError, ErrorCategory, Result, Service};
