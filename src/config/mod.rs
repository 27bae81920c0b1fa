//! Configuration system
//!
//! Loads ~/.config/bugbridge/config.yaml with support for:
//! - Multiple Sentry and Linear instances
//! - Connections pairing one instance of each with project mappings
//! - Migration from the legacy single-instance layout
//! - Structural validation

mod bugbridge_config;
pub mod migration;
pub(crate) mod serde_ext;
mod store;
pub mod validation;

pub use bugbridge_config::{
    BugBridgeConfig, BugManagerSection, LegacyLinearProject, LegacySentryProject, LinearSection,
    SentrySection, Settings,
};
pub use migration::{migrate, MigrationReport};
pub use store::{ConfigHandle, ConfigStore, FileConfigStore, MemoryConfigStore};
pub use validation::{validate_config, ValidationError};
