//! bugbridge - Sentry to Linear issue sync
//!
//! Main entry point for the bugbridge CLI.

mod commands;

use bugbridge::config::{validate_config, BugBridgeConfig, ConfigHandle, FileConfigStore};
use bugbridge::connections::{parse_label_list, parse_source_path, Connection, ProjectMapping};
use bugbridge::integrations::{ClientFactory, HttpClientFactory};
use bugbridge::prompt::{any_input, non_empty, Prompter, TerminalPrompter};
use bugbridge::registry::{Instance, InstanceEdit, InstanceKey, InstanceKind, Linear, Sentry};
use bugbridge::style;
use bugbridge::sync::{self, SyncOutcome, SyncRequest};
use bugbridge::{BugBridgeError, Result, Service};
use clap::Parser;
use commands::{
    custom_help, Cli, Commands, ConfigCommands, ConnectionCommands, InstanceCommands,
    IssueCommands, KindArg, MappingCommands,
};
use std::process;

type Handle = ConfigHandle<FileConfigStore>;

/// Placeholder printed instead of API keys
const REDACTED: &str = "********";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = bugbridge::logging::init(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            println!("{}", style::dim("Cancelled, nothing was changed."))
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            for (service, kind) in [(Service::Sentry, "sentry"), (Service::Linear, "linear")] {
                if e.is_unavailable(service) {
                    eprintln!(
                        "{}",
                        style::dim(&format!(
                            "Check the instance with: bugbridge instance test {} <KEY>",
                            kind
                        ))
                    );
                }
            }
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        println!("{}", custom_help());
        return Ok(());
    };

    let path = cli.config.unwrap_or_else(BugBridgeConfig::default_path);
    if let Commands::Config(ConfigCommands::Path) = command {
        println!("{}", path.display());
        return Ok(());
    }

    let (mut handle, report) = ConfigHandle::open(path.clone())?;
    for line in report.describe() {
        tracing::info!(path = %path.display(), "{}", line);
    }
    tracing::debug!(
        path = %path.display(),
        connections = handle.connections().len(),
        "Configuration loaded"
    );

    let mut prompter = TerminalPrompter::new();
    let factory = HttpClientFactory;

    match command {
        Commands::Sync {
            connection,
            project,
            limit,
        } => {
            let request = SyncRequest {
                connection,
                project,
                limit,
            };
            handle_sync(&handle, &factory, &mut prompter, &request).await
        }
        Commands::Issue(IssueCommands::Create { instance }) => {
            sync::create_manual_issue(handle.config(), &factory, &mut prompter, instance.as_deref())
                .await?;
            Ok(())
        }
        Commands::Instance(cmd) => {
            handle_instance_command(cmd, &mut handle, &factory, &mut prompter).await
        }
        Commands::Connection(cmd) => {
            handle_connection_command(cmd, &mut handle, &factory, &mut prompter).await
        }
        Commands::Mapping(cmd) => {
            handle_mapping_command(cmd, &mut handle, &factory, &mut prompter).await
        }
        Commands::Config(cmd) => handle_config_command(cmd, &handle, &report.describe()),
    }
}

async fn handle_sync(
    handle: &Handle,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
    request: &SyncRequest,
) -> Result<()> {
    let outcomes = sync::run_session(handle.config(), factory, prompter, request).await?;

    let synced: Vec<_> = outcomes.iter().filter_map(SyncOutcome::created).collect();
    if synced.is_empty() {
        return Ok(());
    }

    println!();
    println!("{}", style::header("Synced issues:"));
    for s in synced {
        let mut line = format!(
            "  {} → {} [{}] {}",
            style::issue_id(&s.source_short_id),
            style::issue_id(&s.issue.identifier),
            style::priority_style(s.issue.priority),
            style::path(&s.issue.url)
        );
        if s.resolved_in_source {
            line.push_str(&format!(" {}", style::success("(resolved in Sentry)")));
        }
        println!("{}", line);
        if !s.skipped_labels.is_empty() {
            println!(
                "    {}",
                style::warning(&format!("labels skipped: {}", s.skipped_labels.join(", ")))
            );
        }
        if let Some(ref warning) = s.resolve_warning {
            println!("    {}", style::warning(warning));
        }
    }
    Ok(())
}

// =============================================================================
// Instances
// =============================================================================

async fn handle_instance_command(
    cmd: InstanceCommands,
    handle: &mut Handle,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    match cmd {
        InstanceCommands::List { kind } => {
            if kind != Some(KindArg::Linear) {
                print_instances::<Sentry>(handle);
            }
            if kind != Some(KindArg::Sentry) {
                print_instances::<Linear>(handle);
            }
            Ok(())
        }
        InstanceCommands::Add {
            kind,
            key,
            name,
            api_key,
            base_url,
            skip_test,
        } => {
            let args = AddInstance {
                key,
                name,
                api_key,
                base_url,
                skip_test,
            };
            match kind {
                KindArg::Sentry => add_instance::<Sentry>(handle, factory, prompter, args).await,
                KindArg::Linear => add_instance::<Linear>(handle, factory, prompter, args).await,
            }
        }
        InstanceCommands::Edit {
            kind,
            key,
            name,
            api_key,
            base_url,
        } => {
            let edit = InstanceEdit {
                name,
                api_key,
                base_url,
            };
            if edit.is_empty() {
                return Err(BugBridgeError::Config(
                    "Nothing to change: pass --name, --api-key or --base-url".to_string(),
                ));
            }
            match kind {
                KindArg::Sentry => handle.update_instance::<Sentry>(&key, edit)?,
                KindArg::Linear => handle.update_instance::<Linear>(&key, edit)?,
            }
            prompter.success(&format!("Instance '{}' updated", key));
            Ok(())
        }
        InstanceCommands::Remove { kind, key, yes } => match kind {
            KindArg::Sentry => remove_instance::<Sentry>(handle, prompter, &key, yes),
            KindArg::Linear => remove_instance::<Linear>(handle, prompter, &key, yes),
        },
        InstanceCommands::Test { kind, key } => {
            let instance = match kind {
                KindArg::Sentry => lookup_instance::<Sentry>(handle, &key)?,
                KindArg::Linear => lookup_instance::<Linear>(handle, &key)?,
            };
            let service = match kind {
                KindArg::Sentry => Service::Sentry,
                KindArg::Linear => Service::Linear,
            };
            prompter.info(&format!("Testing {} connection...", service));
            let summary = check_access(service, &instance, factory).await?;
            prompter.success(&format!("{} connection successful! ({})", service, summary));
            Ok(())
        }
    }
}

struct AddInstance {
    key: String,
    name: String,
    api_key: Option<String>,
    base_url: Option<String>,
    skip_test: bool,
}

async fn add_instance<K: InstanceKind>(
    handle: &mut Handle,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
    args: AddInstance,
) -> Result<()> {
    let key = InstanceKey::parse(args.key)?;
    if handle.instance::<K>(key.as_str()).is_some() {
        return Err(BugBridgeError::DuplicateKey {
            kind: K::LABEL,
            key: key.to_string(),
        });
    }

    let api_key = match args.api_key {
        Some(api_key) => api_key,
        None => prompter.password(&format!("{} API key", K::LABEL))?,
    };
    let mut instance = Instance::new(args.name, api_key);
    if let Some(base_url) = args.base_url {
        instance = instance.with_base_url(base_url);
    }

    if !args.skip_test {
        prompter.info(&format!("Testing {} connection...", K::LABEL));
        match check_access(K::SERVICE, &instance, factory).await {
            Ok(summary) => prompter.success(&format!("Connection OK ({})", summary)),
            Err(e) => {
                prompter.warn(&format!("Connection test failed: {}", e));
                if !prompter.confirm("Continue anyway?", false)? {
                    return Err(BugBridgeError::UserCancelled);
                }
            }
        }
    }

    handle.add_instance::<K>(key.clone(), instance)?;
    prompter.success(&format!("{} instance '{}' added", K::LABEL, key));
    Ok(())
}

fn remove_instance<K: InstanceKind>(
    handle: &mut Handle,
    prompter: &mut dyn Prompter,
    key: &str,
    yes: bool,
) -> Result<()> {
    lookup_instance::<K>(handle, key)?;
    if !yes && !prompter.confirm(&format!("Remove {} instance '{}'?", K::LABEL, key), false)? {
        return Err(BugBridgeError::UserCancelled);
    }
    handle.remove_instance::<K>(key)?;
    prompter.success(&format!("{} instance '{}' removed", K::LABEL, key));
    Ok(())
}

fn lookup_instance<K: InstanceKind>(handle: &Handle, key: &str) -> Result<Instance> {
    handle
        .instance::<K>(key)
        .cloned()
        .ok_or_else(|| BugBridgeError::NotFound(format!("{} instance '{}'", K::LABEL, key)))
}

fn print_instances<K: InstanceKind>(handle: &Handle) {
    println!("{}", style::header(&format!("{} instances:", K::LABEL)));
    let instances = handle.instances::<K>();
    if instances.is_empty() {
        println!("  {}", style::dim("(none)"));
    }
    for (key, instance) in instances {
        let users = handle.connections_using::<K>(key.as_str());
        let mut line = format!(
            "  {}  {}  {}",
            style::highlight(key.as_str()),
            instance.name,
            style::path(instance.endpoint::<K>())
        );
        if instance.api_key.is_empty() {
            line.push_str(&format!("  {}", style::warning("(no API key)")));
        }
        if !users.is_empty() {
            line.push_str(&format!("  {}", style::dim(&format!("used by: {}", users.join(", ")))));
        }
        println!("{}", line);
    }
    println!();
}

/// Cheapest authenticated call against the service
async fn check_access(
    service: Service,
    instance: &Instance,
    factory: &dyn ClientFactory,
) -> Result<String> {
    match service {
        Service::Sentry => {
            let projects = factory.source(instance)?.list_projects().await?;
            Ok(format!("{} projects visible", projects.len()))
        }
        Service::Linear => {
            let teams = factory.sink(instance)?.list_teams().await?;
            Ok(format!("{} teams visible", teams.len()))
        }
    }
}

// =============================================================================
// Connections
// =============================================================================

async fn handle_connection_command(
    cmd: ConnectionCommands,
    handle: &mut Handle,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    match cmd {
        ConnectionCommands::List => {
            if handle.connections().is_empty() {
                println!("No connections configured.");
                println!(
                    "Add one with: bugbridge connection add <NAME> --sentry <KEY> --linear <KEY>"
                );
                return Ok(());
            }
            for conn in handle.connections() {
                println!("{}", style::header(&sync::connection_line(handle.config(), conn)));
                for m in &conn.project_mappings {
                    let labels = if m.default_labels.is_empty() {
                        String::new()
                    } else {
                        format!(" {}", style::dim(&format!("[{}]", m.default_labels.join(", "))))
                    };
                    println!(
                        "  {} → {}{}",
                        style::path(&m.source_path()),
                        m.target_display(),
                        labels
                    );
                }
            }
            Ok(())
        }
        ConnectionCommands::Add {
            name,
            sentry,
            linear,
        } => {
            let connection = Connection::new(
                name.clone(),
                InstanceKey::parse(sentry)?,
                InstanceKey::parse(linear)?,
            );
            handle.add_connection(connection)?;
            prompter.success(&format!("Connection '{}' created successfully!", name));
            prompter.info(&format!("Add project mappings with: bugbridge mapping add {}", name));
            Ok(())
        }
        ConnectionCommands::Rename { name, new_name } => {
            handle.rename_connection(&name, &new_name)?;
            prompter.success(&format!("Connection '{}' renamed to '{}'", name, new_name));
            Ok(())
        }
        ConnectionCommands::SetInstances {
            name,
            sentry,
            linear,
        } => {
            if sentry.is_none() && linear.is_none() {
                return Err(BugBridgeError::Config(
                    "Nothing to change: pass --sentry and/or --linear".to_string(),
                ));
            }
            let sentry = sentry.map(InstanceKey::parse).transpose()?;
            let linear = linear.map(InstanceKey::parse).transpose()?;
            handle.set_connection_instances(&name, sentry, linear)?;
            prompter.success(&format!("Connection '{}' updated", name));
            Ok(())
        }
        ConnectionCommands::Remove { name, yes } => {
            if handle.connection(&name).is_none() {
                return Err(BugBridgeError::NotFound(format!("connection '{}'", name)));
            }
            if !yes && !prompter.confirm(&format!("Remove connection '{}'?", name), false)? {
                return Err(BugBridgeError::UserCancelled);
            }
            handle.remove_connection(&name)?;
            prompter.success("Connection removed successfully!");
            Ok(())
        }
        ConnectionCommands::Test { name } => {
            let conn = handle
                .connection(&name)
                .ok_or_else(|| BugBridgeError::NotFound(format!("connection '{}'", name)))?;
            let sentry = referenced::<Sentry>(handle, conn)?;
            let linear = referenced::<Linear>(handle, conn)?;

            prompter.info("Testing Sentry connection...");
            check_access(Service::Sentry, &sentry, factory).await?;
            prompter.success("Sentry connection successful!");

            prompter.info("Testing Linear connection...");
            check_access(Service::Linear, &linear, factory).await?;
            prompter.success("Linear connection successful!");
            Ok(())
        }
    }
}

/// The instance of kind `K` a connection points at
fn referenced<K: InstanceKind>(handle: &Handle, conn: &Connection) -> Result<Instance> {
    let key = K::referenced_by(conn);
    handle.instance::<K>(key.as_str()).cloned().ok_or_else(|| {
        BugBridgeError::Referential(format!(
            "Connection '{}' references missing {} instance '{}'",
            conn.name,
            K::LABEL,
            key
        ))
    })
}

// =============================================================================
// Project mappings
// =============================================================================

async fn handle_mapping_command(
    cmd: MappingCommands,
    handle: &mut Handle,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    match cmd {
        MappingCommands::Add { connection } => {
            add_mapping(handle, factory, prompter, &connection).await
        }
        MappingCommands::Labels {
            connection,
            project,
            labels,
        } => {
            let (org, proj) = parse_source_path(&project)?;
            handle.set_mapping_labels(&connection, &org, &proj, parse_label_list(&labels))?;
            prompter.success("Labels updated successfully!");
            Ok(())
        }
        MappingCommands::Remove {
            connection,
            project,
            yes,
        } => {
            let (org, proj) = parse_source_path(&project)?;
            let question = format!("Remove mapping {} from '{}'?", project, connection);
            if !yes && !prompter.confirm(&question, false)? {
                return Err(BugBridgeError::UserCancelled);
            }
            handle.remove_mapping(&connection, &org, &proj)?;
            prompter.success("Mapping removed successfully!");
            Ok(())
        }
    }
}

async fn add_mapping(
    handle: &mut Handle,
    factory: &dyn ClientFactory,
    prompter: &mut dyn Prompter,
    connection: &str,
) -> Result<()> {
    let conn = handle
        .connection(connection)
        .ok_or_else(|| BugBridgeError::NotFound(format!("connection '{}'", connection)))?;
    let source = factory.source(&referenced::<Sentry>(handle, conn)?)?;
    let sink = factory.sink(&referenced::<Linear>(handle, conn)?)?;

    prompter.info("Fetching Sentry projects...");
    let projects: Vec<_> = source
        .list_projects()
        .await?
        .into_iter()
        .filter(|p| conn.mapping(&p.organization_slug, &p.slug).is_none())
        .collect();
    if projects.is_empty() {
        prompter.warn("No unmapped Sentry projects found.");
        return Ok(());
    }
    let items: Vec<String> = projects
        .iter()
        .map(|p| format!("{}/{}", p.organization_slug, p.slug))
        .collect();
    let project = &projects[prompter.select("Select Sentry project", &items, 0)?];
    let organization = if project.organization_slug.is_empty() {
        prompter.input("Sentry organization slug", None, &non_empty)?
    } else {
        project.organization_slug.clone()
    };

    prompter.info("Fetching Linear teams...");
    let teams = sink.list_teams().await?;
    if teams.is_empty() {
        prompter.warn("No Linear teams found.");
        return Ok(());
    }
    let items: Vec<String> = teams
        .iter()
        .map(|t| format!("{} ({})", t.name, t.key))
        .collect();
    let team = &teams[prompter.select("Select Linear team", &items, 0)?];

    prompter.info("Fetching Linear projects...");
    let linear_projects = sink.list_projects(&team.id).await?;
    let mut items = vec!["No Project (Team only)".to_string()];
    items.extend(linear_projects.iter().map(|p| p.name.clone()));
    let choice = prompter.select("Select Linear project (optional)", &items, 0)?;
    let (project_id, project_name) = match choice {
        0 => (None, format!("{} (Team)", team.name)),
        i => {
            let p = &linear_projects[i - 1];
            (Some(p.id.clone()), p.name.clone())
        }
    };

    let labels = prompter.input(
        "Default labels for synced bugs (comma-separated)",
        Some("bug,sentry"),
        &any_input,
    )?;

    let mut mapping = ProjectMapping::new(organization, project.slug.clone(), team.id.clone())
        .with_labels(parse_label_list(&labels));
    mapping.set_project(project_id, project_name);

    handle.add_mapping(connection, mapping)?;
    prompter.success("Project mapping added successfully!");
    Ok(())
}

// =============================================================================
// Config
// =============================================================================

fn handle_config_command(cmd: ConfigCommands, handle: &Handle, migrated: &[String]) -> Result<()> {
    match cmd {
        ConfigCommands::Path => {
            println!("{}", handle.store().path().display());
            Ok(())
        }
        ConfigCommands::Show => {
            let yaml = serde_yaml::to_string(&redacted(handle.config()))?;
            print!("{}", yaml);
            Ok(())
        }
        ConfigCommands::Validate => match validate_config(handle.config()) {
            Ok(()) => {
                println!("{} Configuration is valid", style::success("✓"));
                Ok(())
            }
            Err(errors) => {
                for e in &errors {
                    println!("{} {}", style::error("✗"), e);
                }
                Err(BugBridgeError::Config(format!(
                    "{} problem(s) found in {}",
                    errors.len(),
                    handle.store().path().display()
                )))
            }
        },
        ConfigCommands::Migrate => {
            // Loading already migrated and saved the file
            if migrated.is_empty() {
                println!("Nothing to migrate.");
            } else {
                for line in migrated {
                    println!("{} {}", style::success("✓"), line);
                }
                println!("Saved {}", style::path(&handle.store().path().display().to_string()));
            }
            Ok(())
        }
    }
}

/// Copy of the config with every API key masked
fn redacted(config: &BugBridgeConfig) -> BugBridgeConfig {
    fn mask(key: &mut String) {
        if !key.is_empty() {
            *key = REDACTED.to_string();
        }
    }

    let mut config = config.clone();
    mask(&mut config.sentry.api_key);
    mask(&mut config.linear.api_key);

    let keys: Vec<String> = config.sentry.instances.keys().map(|k| k.to_string()).collect();
    for key in keys {
        if let Some(instance) = config.sentry.instances.get_mut(&key) {
            mask(&mut instance.api_key);
        }
    }
    let keys: Vec<String> = config.linear.instances.keys().map(|k| k.to_string()).collect();
    for key in keys {
        if let Some(instance) = config.linear.instances.get_mut(&key) {
            mask(&mut instance.api_key);
        }
    }
    config
}
