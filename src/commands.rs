//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Grouped overview printed when no command is given
pub fn custom_help() -> String {
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    format!(
        r#"Sync Sentry issues into Linear

Usage:
  bugbridge [flags]
  bugbridge [command]

{cyan}Sync:{reset}
  sync               Pick an unresolved Sentry issue and create it in Linear
  issue create       Create a Linear issue by hand

{cyan}Setup:{reset}
  instance           Manage Sentry and Linear instances (list/add/edit/remove/test)
  connection         Manage Sentry-Linear connections
  mapping            Manage project mappings of a connection

{cyan}Configuration:{reset}
  config path        Print the config file location
  config show        Print the config with API keys redacted
  config validate    Check the config for structural problems
  config migrate     Upgrade a legacy single-instance config

Flags:
  -c, --config <PATH>   Config file (default: ~/.config/bugbridge/config.yaml)
  -v, --verbose         Debug logging on stderr
  -h, --help            Help for bugbridge
  -V, --version         Version for bugbridge

Use "bugbridge [command] --help" for more information about a command."#,
        reset = reset,
        cyan = cyan
    )
}

/// bugbridge - Sentry to Linear issue sync
#[derive(Parser, Debug)]
#[command(name = "bugbridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/bugbridge/config.yaml)
    #[arg(short, long, global = true, env = "BUGBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Which registry an instance command targets
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Sentry,
    Linear,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync one Sentry issue into Linear
    Sync {
        /// Connection to use (prompted when several exist)
        #[arg(long)]
        connection: Option<String>,

        /// Sentry project as ORG/PROJECT (prompted when several are mapped)
        #[arg(short, long)]
        project: Option<String>,

        /// Maximum unresolved issues to list (default: settings.issue_fetch_limit)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        limit: Option<u32>,
    },

    /// Linear issue commands
    #[command(subcommand)]
    Issue(IssueCommands),

    /// Manage Sentry and Linear instances
    #[command(subcommand)]
    Instance(InstanceCommands),

    /// Manage connections
    #[command(subcommand)]
    Connection(ConnectionCommands),

    /// Manage project mappings
    #[command(subcommand)]
    Mapping(MappingCommands),

    /// Inspect and maintain the config file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum IssueCommands {
    /// Create a Linear issue interactively
    Create {
        /// Linear instance key (prompted when several exist)
        #[arg(long)]
        instance: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum InstanceCommands {
    /// List instances
    List {
        /// Only this kind
        kind: Option<KindArg>,
    },

    /// Register an instance
    Add {
        kind: KindArg,

        /// Instance key (e.g., "work")
        key: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// API key (prompted when omitted)
        #[arg(long)]
        api_key: Option<String>,

        /// API base URL override
        #[arg(long)]
        base_url: Option<String>,

        /// Do not test the API key before saving
        #[arg(long)]
        skip_test: bool,
    },

    /// Change fields of an instance
    Edit {
        kind: KindArg,

        key: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(long)]
        api_key: Option<String>,

        /// New base URL (empty string resets to the public endpoint)
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Remove an unused instance
    Remove {
        kind: KindArg,

        key: String,

        /// Skip the confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Check that the instance's API key works
    Test { kind: KindArg, key: String },
}

#[derive(Subcommand, Debug)]
pub enum ConnectionCommands {
    /// List connections and their mappings
    List,

    /// Create a connection between two instances
    Add {
        name: String,

        /// Sentry instance key
        #[arg(long)]
        sentry: String,

        /// Linear instance key
        #[arg(long)]
        linear: String,
    },

    /// Rename a connection
    Rename { name: String, new_name: String },

    /// Point a connection at different instances
    SetInstances {
        name: String,

        #[arg(long)]
        sentry: Option<String>,

        #[arg(long)]
        linear: Option<String>,
    },

    /// Remove a connection and its mappings
    Remove {
        name: String,

        #[arg(short, long)]
        yes: bool,
    },

    /// Check both instances of a connection
    Test { name: String },
}

#[derive(Subcommand, Debug)]
pub enum MappingCommands {
    /// Map a Sentry project to a Linear team (interactive)
    Add { connection: String },

    /// Replace the default labels of a mapping
    Labels {
        connection: String,

        /// Sentry project as ORG/PROJECT
        project: String,

        /// Comma-separated labels (empty clears)
        labels: String,
    },

    /// Remove a mapping
    Remove {
        connection: String,

        /// Sentry project as ORG/PROJECT
        project: String,

        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the config file path
    Path,

    /// Print the config with API keys redacted
    Show,

    /// Validate the config
    Validate,

    /// Migrate legacy settings and save
    Migrate,
}
