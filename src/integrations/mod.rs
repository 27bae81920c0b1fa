//! External Integrations
//!
//! Adapters for the two systems bugbridge connects.
//!
//! # Built-in Integrations
//!
//! - **Sentry**: REST API adapter, the issue source
//! - **Linear**: GraphQL API adapter, the issue sink
//!
//! Both sit behind async traits ([`SourceApi`], [`SinkApi`]) so the sync
//! logic can run against in-memory fakes. A [`ClientFactory`] turns a
//! registered instance into a live client.

pub mod linear;
pub mod sentry;

use crate::registry::Instance;
use crate::Result;

// Linear exports
pub use linear::{
    CreatedIssue, IssueDraft, IssueStateRef, LinearClient, LinearLabel, LinearProject, LinearTeam,
    Priority, SinkApi, WorkflowCategory, WorkflowState,
};

// Sentry exports
pub use sentry::{
    ExceptionValue, Frame, SentryClient, SentryEvent, SentryIssue, SentryOrganization,
    SentryProject, SourceApi,
};

/// Builds API clients for registered instances
pub trait ClientFactory {
    fn source(&self, instance: &Instance) -> Result<Box<dyn SourceApi>>;

    fn sink(&self, instance: &Instance) -> Result<Box<dyn SinkApi>>;
}

/// Factory producing the real HTTP clients
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn source(&self, instance: &Instance) -> Result<Box<dyn SourceApi>> {
        Ok(Box::new(SentryClient::new(instance)?))
    }

    fn sink(&self, instance: &Instance) -> Result<Box<dyn SinkApi>> {
        Ok(Box::new(LinearClient::new(instance)?))
    }
}
