//! `agora` command-line entry point.
//!
//! ```text
//! agora [--config <path>] list
//! agora [--config <path>] refresh
//! agora [--config <path>] hydrate <assistant-id>
//! agora [--config <path>] watch
//! ```

use std::sync::Arc;

use agora_client::config::AgoraConfig;
use agora_client::error::CliError;
use agora_client::telemetry::init_tracing;
use agora_client::{DirectorySnapshot, LoadOutcome, RestClient, SyncEngine};
use agora_core::{Assistant, AssistantId, SystemClock};
use agora_storage::LmdbKvStore;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    List,
    Refresh,
    Hydrate(AssistantId),
    Watch,
}

fn parse_command() -> Result<Command, CliError> {
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        positional.push(arg);
    }

    match positional.as_slice() {
        [cmd] if cmd == "list" => Ok(Command::List),
        [cmd] if cmd == "refresh" => Ok(Command::Refresh),
        [cmd] if cmd == "watch" => Ok(Command::Watch),
        [cmd, id] if cmd == "hydrate" => Ok(Command::Hydrate(AssistantId::new(id.as_str()))),
        _ => Err(CliError::Usage),
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let command = parse_command()?;
    let config = AgoraConfig::load()?;
    init_tracing(&config.logging)?;

    let backend = RestClient::new(&config.api_base_url, config.request_timeout())?;
    let store = LmdbKvStore::open(&config.cache.store_path, config.cache.store_max_size_mb)?;
    let engine = SyncEngine::new(
        Arc::new(backend),
        Arc::new(store),
        Arc::new(SystemClock),
        config.engine_settings(),
    );

    engine.login(config.session())?;
    let result = run(&engine, command).await;
    engine.logout();
    result
}

async fn run(engine: &SyncEngine, command: Command) -> Result<(), CliError> {
    match command {
        Command::List => {
            let outcome = engine.load_directory().await?;
            print_outcome(&outcome);
            print_directory(&engine.snapshot());
        }
        Command::Refresh => {
            let outcome = engine.refresh_directory().await?;
            print_outcome(&outcome);
            print_directory(&engine.snapshot());
        }
        Command::Hydrate(assistant_id) => {
            engine.load_directory().await?;
            let full = engine.hydrate(&assistant_id).await?;
            println!(
                "{}  {}  graph={}  version={}",
                full.summary.assistant_id,
                full.summary.name,
                full.summary.graph_id,
                full.version.map_or_else(|| "-".to_string(), |v| v.to_string())
            );
            println!(
                "config: {}",
                serde_json::Value::Object(full.config.clone())
            );
            println!(
                "metadata: {}",
                serde_json::Value::Object(full.metadata.clone())
            );
        }
        Command::Watch => watch(engine).await?,
    }

    let stats = engine.cache_stats();
    let usage = engine.store_usage().await?;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        writes = stats.writes,
        entries = usage.entries,
        bytes = usage.bytes,
        "cache summary"
    );
    Ok(())
}

/// Print the directory, then reload it whenever backend versions change.
async fn watch(engine: &SyncEngine) -> Result<(), CliError> {
    let outcome = engine.load_directory().await?;
    print_outcome(&outcome);
    print_directory(&engine.snapshot());

    let mut versions = engine.subscribe_versions();
    versions.borrow_and_update();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping watch");
                break;
            }
            changed = versions.changed() => {
                if changed.is_err() {
                    break;
                }
                versions.borrow_and_update();
                match engine.load_directory().await {
                    Ok(outcome) => {
                        print_outcome(&outcome);
                        print_directory(&engine.snapshot());
                    }
                    Err(err) => warn!(error = %err, "reload after version change failed"),
                }
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &LoadOutcome) {
    println!(
        "# {} assistants from {:?} ({})",
        outcome.assistants, outcome.source, outcome.fingerprint
    );
}

fn print_directory(snapshot: &DirectorySnapshot) {
    if let Some(name) = &snapshot.deployment_name {
        println!("deployment: {name}");
    }
    for graph in &snapshot.valid_graphs {
        println!("graph  {}  {}", graph.graph_id, graph.name);
    }
    for entry in &snapshot.assistants {
        let marker = match (&entry.assistant, entry.is_provisional()) {
            (_, true) => "+",
            (Assistant::Full(_), false) => "*",
            (Assistant::Lightweight(_), false) => " ",
        };
        let summary = entry.assistant.summary();
        println!(
            "{marker} {}  {}  graph={}",
            summary.assistant_id, summary.name, summary.graph_id
        );
    }
}
