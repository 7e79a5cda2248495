//! GoalNet - CLI client
//!
//! Thin front end over the sync engine: pulls the graph, applies single
//! mutations, and renders track / history reports. All logic lives in the
//! library.

use anyhow::Result;
use clap::{Parser, Subcommand};
use goalnet::activation::propagate;
use goalnet::events::{EventKind, GraphEvent};
use goalnet::graph::engine::MutationEngine;
use goalnet::graph::GraphState;
use goalnet::graph::NodeDraft;
use goalnet::history::HistoryLedger;
use goalnet::remote::{HttpRemoteStore, RemoteStore};
use goalnet::Config;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "goalnet")]
#[command(about = "Goal graph sync client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the graph and print nodes with activation and level
    Pull,
    /// Add a node at a position
    Add {
        x: f64,
        y: f64,
    },
    /// Set a node's name and commit value
    Set {
        id: String,
        name: String,
        commit: i64,
    },
    /// Set or clear a weighted link between two nodes
    Link {
        source: String,
        target: String,
        /// Weight 1..=3; omit to delete the link
        weight: Option<u8>,
    },
    /// Delete a node
    Rm {
        id: String,
    },
    /// Show daily level snapshots from the remote track records
    Tracks,
    /// Bulk-create nodes from a JSON file under another owner
    /// (requires an elevated credential)
    Import {
        /// Path to a JSON array of node drafts
        file: String,
        /// Owner to create the nodes under
        #[arg(long)]
        owner: String,
    },
    /// Show recent commit deltas for acute nodes from the local ledger
    History {
        /// Days to show, most recent first
        #[arg(long, default_value = "4")]
        days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,goalnet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let bus = goalnet::events::EventBus::new();
    // Surface every sync failure on stderr; the engine never propagates
    // them to callers.
    let _failures = bus.subscribe(EventKind::SyncFailed, |event| {
        if let GraphEvent::SyncFailed(failure) = event {
            eprintln!("sync failed ({}): {}", failure.operation, failure.reason);
        }
        Ok(())
    });

    let state = Arc::new(GraphState::new(bus.clone()));
    let remote = Arc::new(HttpRemoteStore::new(&config.api_base_url, &config.api_token));
    let history = Arc::new(HistoryLedger::load(&config.ledger_path));
    let engine = MutationEngine::new(
        state,
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        bus,
        Arc::clone(&history),
        config.debounce_ms,
    );

    // Import is an admin path: it talks to the remote directly and does
    // not need (or want) the caller's own graph hydrated first.
    if let Commands::Import { file, owner } = &cli.command {
        let contents = std::fs::read_to_string(file)?;
        let drafts: Vec<NodeDraft> = serde_json::from_str(&contents)?;
        remote.bulk_create_for(owner, &drafts).await?;
        println!("imported {} nodes for {owner}", drafts.len());
        return Ok(());
    }

    engine.refresh().await;

    match cli.command {
        Commands::Pull => {
            let nodes = propagate(&engine.state().snapshot(), &config.activation);
            println!("{:<24} {:>8} {:>10} {:>5}  name", "id", "commit", "activation", "lv");
            for node in &nodes {
                println!(
                    "{:<24} {:>8} {:>10.2} {:>5}  {}",
                    node.id,
                    node.commit,
                    node.activation,
                    node.level(),
                    node.name
                );
            }
        }
        Commands::Add { x, y } => {
            let (_node, handle) = engine.add_node(x, y);
            handle.await?;
            // The temp id is renamed in place on success; if the create
            // failed the node was rolled back and the failure handler
            // already spoke.
            if let Some(confirmed) = engine
                .state()
                .snapshot()
                .iter()
                .find(|n| !n.has_temp_id() && n.x == x && n.y == y)
            {
                println!("created {}", confirmed.id);
            }
        }
        Commands::Set { id, name, commit } => {
            if let Some(handle) = engine.update_content(&id, &name, commit)? {
                handle.await?;
            }
        }
        Commands::Link {
            source,
            target,
            weight,
        } => {
            if let Some(handle) = engine.update_link(&source, &target, weight)? {
                handle.await?;
            }
        }
        Commands::Rm { id } => {
            if let Some(handle) = engine.delete_node(&id) {
                handle.await?;
            }
        }
        Commands::Tracks => {
            let tracks = engine.fetch_tracks().await;
            if tracks.is_empty() {
                println!("no track records");
            }
            for track in &tracks {
                println!("{}", track.date);
                for (node_id, level) in &track.levels {
                    let name = engine
                        .state()
                        .get(node_id)
                        .map(|n| n.name)
                        .unwrap_or_else(|| "(unknown node)".into());
                    println!("  {name} ({node_id}): Lv.{level}");
                }
            }
        }
        // Handled above, before hydration.
        Commands::Import { .. } => unreachable!(),
        Commands::History { days } => {
            let acute: Vec<_> = engine
                .state()
                .snapshot()
                .into_iter()
                .filter(|n| n.acute)
                .collect();
            if acute.is_empty() {
                println!("no acute nodes");
            }
            for node in &acute {
                print!("{:<20}", node.name);
                for (_, delta) in history.recent(&node.id, days) {
                    print!(" {delta:>+5}");
                }
                println!();
            }
        }
    }

    Ok(())
}
