//! Connections between Sentry and Linear instances
//!
//! A connection pairs one instance of each kind and carries the project
//! mappings that decide where a Sentry issue lands in Linear.

mod model;
pub mod resolver;
mod store;

pub use model::{
    normalize_labels, parse_label_list, parse_source_path, Connection, ProjectMapping,
};
pub use resolver::{resolve, resolve_project, ResolvedMapping};
