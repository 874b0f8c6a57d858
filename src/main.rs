//! chathub daemon entry point
//!
//! Bootstraps logging, assembles the settings tree (core schema plus plugin
//! grafts), restores dynamic entries, hydrates persisted values and then
//! either runs the daemon or executes a one-shot configuration command.

use std::sync::Arc;

use anyhow::anyhow;
use chathub::{
    cli::{ChatHubCli, Commands, ConfigAction},
    logging::{init_logging, LogConfig, LogLevel},
    notify::EventBus,
    persist::PersistenceEngine,
    schema::core::{core_schema, restore_dynamic_entries},
    tree::{NodeKind, SettingsTree},
    NodePath, Result,
};
use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ChatHubCli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    init_logging(&log_config).map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    info!("chathub v{}", env!("CARGO_PKG_VERSION"));

    let config_dir = cli
        .config_dir
        .unwrap_or_else(PersistenceEngine::default_config_dir);
    debug!(dir = %config_dir.display(), "using config directory");

    let bus = Arc::new(EventBus::default());
    // Plugin descriptors are collected by the plugin loader before this
    // point; the assembler is the only consumer of that contract.
    let (tree, rejected) = SettingsTree::assemble(
        &core_schema(),
        &[],
        PersistenceEngine::new(config_dir),
        bus.clone(),
    )?;
    for err in &rejected {
        warn!(error = %err, "plugin settings excluded from the tree");
    }

    let restored = restore_dynamic_entries(&tree).await?;
    if restored > 0 {
        debug!(restored, "dynamic settings entries restored");
    }
    // An unreadable backing file means configuration-unavailable; there are
    // no safe defaults for credentials, so startup stops here.
    let report = tree.load().await?;
    info!(
        hydrated = report.hydrated,
        unknown = report.unknown,
        invalid = report.invalid,
        "settings loaded"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(tree, bus).await,
        Commands::Config(config) => handle_config(tree, config.action).await,
    }
}

/// Keep the tree alive for the transport and marketplace handlers and log
/// change events until shutdown.
async fn run(_tree: SettingsTree, bus: Arc<EventBus>) -> Result<()> {
    let mut events = bus.subscribe();
    info!("chathub running, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            event = events.recv() => {
                if let Ok(event) = event {
                    info!(path = %event.path(), "settings changed");
                }
            }
        }
    }
    Ok(())
}

async fn handle_config(tree: SettingsTree, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { path } => {
            let path = NodePath::parse_dotted(&path);
            for row in tree.snapshot(&path).await? {
                match row.kind {
                    NodeKind::Section => println!("{}/", row.id),
                    NodeKind::Parameter => {
                        println!("{} = {}", row.id, row.value.unwrap_or_default())
                    }
                }
            }
        }
        ConfigAction::Get { path } => {
            let path = NodePath::parse_dotted(&path);
            println!("{}", tree.get(&path).await?.render());
        }
        ConfigAction::Set {
            path,
            value,
            no_persist,
        } => {
            let path = NodePath::parse_dotted(&path);
            tree.set_value(&path, value.as_str(), !no_persist).await?;
            if no_persist {
                println!("{} updated (not persisted)", path);
            } else {
                println!("{} updated", path);
            }
        }
    }
    Ok(())
}
