//! Reverie server - multi-persona conversational runtime
//!
//! JSON-RPC over WebSocket on top of the reverie memory engine:
//! persona switching, (streaming) chat with continue scoring, per-persona
//! memory with importance decay and safety-checked pruning.

mod llm;
mod methods;
mod protocol;
mod runtime;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reverie_core::{
    DecayWorker, Embedder, HashingEmbedder, MaintenanceLocks, MemoryManager, MemoryPruner, Persona,
    PersonaDirectory, Relationship, RuntimeConfig, SqlitePersonaDirectory, VectorStore,
};

use crate::runtime::AppRuntime;

#[derive(Debug, Parser)]
#[command(name = "reverie-server", version, about = "Multi-persona conversational runtime")]
struct Args {
    /// Listen host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Persona registry database path
    #[arg(long, env = "REVERIE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Optional YAML configuration file
    #[arg(long, env = "REVERIE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    // Defaults -> optional YAML -> REVERIE_* environment (REVERIE_SERVER__PORT=...).
    let mut figment = Figment::from(Serialized::defaults(RuntimeConfig::default()));
    if let Some(path) = &args.config {
        figment = figment.merge(Yaml::file(path));
    }
    figment = figment.merge(Env::prefixed("REVERIE_").split("__"));
    let mut config: RuntimeConfig = figment.extract().context("invalid configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let db_path = match args.db_path {
        Some(path) => path,
        None => SqlitePersonaDirectory::default_path()?,
    };
    let directory: Arc<dyn PersonaDirectory> = Arc::new(
        SqlitePersonaDirectory::open(&db_path)
            .with_context(|| format!("opening persona registry at {}", db_path.display()))?,
    );
    seed_demo_personas(directory.as_ref())?;
    info!(path = %db_path.display(), "persona registry ready");

    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new());
    let store = Arc::new(VectorStore::new(embedder.dimensions()));
    let manager = MemoryManager::new(store, embedder, &config.memory, Arc::clone(&directory));

    let locks = Arc::new(MaintenanceLocks::new());
    let pruner = MemoryPruner::new(Arc::clone(&manager), Arc::clone(&locks), config.pruning.clone());
    let decay = DecayWorker::new(
        Arc::clone(&manager),
        Arc::clone(&pruner),
        locks,
        config.decay.clone(),
    );
    let decay_handle = decay.start();

    let provider = llm::provider_from_config(&config.llm);
    let app_runtime = AppRuntime::new(config.clone(), directory, manager, decay, pruner, provider);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("listening on ws://{addr}/mcp");

    axum::serve(listener, protocol::ws::router(Arc::clone(&app_runtime)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the decay worker finish its current batch, then flush any access
    // bumps still sitting in the drain queue.
    decay_handle.stop().await;
    app_runtime.manager.shutdown().await;
    info!("shutdown complete");
    Ok(())
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

/// First-run convenience: an empty registry gets the two demo personas the
/// client scripts expect.
fn seed_demo_personas(directory: &dyn PersonaDirectory) -> anyhow::Result<()> {
    if !directory.list_personas()?.is_empty() {
        return Ok(());
    }

    let mut aria = Persona::new("aria", "Aria", "a warm tavern bard who collects stories");
    aria.topic_preferences.extend([
        ("magic".to_string(), 80),
        ("stories".to_string(), 70),
        ("gossip".to_string(), 60),
    ]);
    aria.personality_traits.insert("charisma".to_string(), 14.0);
    directory.upsert_persona(&aria)?;

    let mut kira = Persona::new("kira", "Kira", "a terse ranger who knows every road");
    kira.topic_preferences.extend([
        ("travel".to_string(), 85),
        ("local_news".to_string(), 55),
        ("stories".to_string(), 40),
    ]);
    kira.personality_traits.insert("intelligence".to_string(), 12.0);
    directory.upsert_persona(&kira)?;

    let mut relationship = Relationship::new("aria", "kira");
    relationship.affinity = 0.3;
    relationship.trust = 0.2;
    relationship.respect = 0.25;
    directory.upsert_relationship(&relationship)?;

    info!("seeded demo personas aria and kira");
    Ok(())
}
