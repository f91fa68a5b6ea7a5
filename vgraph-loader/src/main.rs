//! vgraph-load - load a vector graph file into an in-memory session.
//!
//! Reads a wire-encoded VectorGraph plus optional sidecar metadata, runs the
//! full loader pipeline and prints a JSON summary of what the session
//! received.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use vgraph_core::SidecarMetadata;
use vgraph_loader::config::VgraphConfig;
use vgraph_loader::{load, LoadEvent, Loaded, MemorySession};

/// Vector graph loader
#[derive(Parser, Debug)]
#[command(name = "vgraph-load")]
#[command(about = "Load a vector graph into an in-memory session")]
#[command(version)]
struct Cli {
    /// Wire-encoded VectorGraph file
    input: PathBuf,

    /// Sidecar metadata JSON (required for version 1 graphs)
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// Configuration file (defaults to ./vgraph.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mapper profile used when the metadata names none
    #[arg(long)]
    mapper: Option<String>,

    /// Seed for the initial layout
    #[arg(long)]
    seed: Option<u64>,

    /// Pretty-print the JSON summary
    #[arg(long)]
    pretty: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct Summary {
    name: String,
    version: u32,
    vertex_count: usize,
    edge_count: usize,
    mapper: &'static str,
    seeded_positions: bool,
    columns: Vec<String>,
    computed_columns: Vec<String>,
    aliases: std::collections::BTreeMap<String, String>,
    warnings: Vec<String>,
}

impl Summary {
    fn new(loaded: Loaded, session: &MemorySession) -> Self {
        Self {
            name: loaded.name,
            version: loaded.version,
            vertex_count: loaded.vertex_count,
            edge_count: loaded.edge_count,
            mapper: loaded.mapper,
            seeded_positions: loaded.seeded_positions,
            columns: session.column_names(),
            computed_columns: session.computed_names(),
            aliases: session.aliases().clone(),
            warnings: loaded.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => VgraphConfig::load_file(path),
        None => VgraphConfig::load(&std::env::current_dir()?),
    };
    let mut options = config.pipeline_options();
    if cli.mapper.is_some() {
        options.default_mapper = cli.mapper.clone();
    }
    if cli.seed.is_some() {
        options.seed = cli.seed;
    }

    let bytes = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read {:?}", cli.input))?;
    let metadata = match &cli.metadata {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            Some(SidecarMetadata::from_json(&json).context("Invalid sidecar metadata")?)
        }
        None => None,
    };

    let mut session = MemorySession::new();

    // Forward progress events to the log
    let mut events = session.events().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                LoadEvent::LoadingStatus(status) => info!("{}", status),
                LoadEvent::SizesForAllocation(hint) => {
                    debug!("Allocation hint: {} points, {} edges", hint.point, hint.edge)
                }
            }
        }
    });

    info!("Loading {:?}", cli.input);
    let loaded = load(&mut session, &bytes, metadata, &options).await?;

    let summary = Summary::new(loaded, &session);
    drop(session);
    let _ = progress.await;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{}", json);
    Ok(())
}
