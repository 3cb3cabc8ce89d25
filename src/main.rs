use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use name_rankings::aggregate::Aggregator;
use name_rankings::api::{build_router, state::AppState};
use name_rankings::cache::spawn_sweeper;
use name_rankings::config::{AppConfig, StoreBackend};
use name_rankings::models::MergePolicy;
use name_rankings::storage::{EntityType, JsonlStore, MemoryStore, StorageConfig, Store};

#[derive(Parser)]
#[command(name = "name-rankings")]
#[command(about = "Rating and analytics backend for a name voting app")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,
    },

    /// Write the fixture catalog and sample activity into the data directory
    Seed {
        /// Replace existing data
        #[arg(long)]
        force: bool,
    },

    /// Print site statistics as JSON
    Stats,
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Pick the store once for the whole process.
fn open_store(config: &AppConfig) -> Arc<dyn Store> {
    match config.store.backend {
        StoreBackend::Jsonl => Arc::new(JsonlStore::new(StorageConfig::new(
            config.data_dir.clone(),
        ))),
        StoreBackend::Fixture => Arc::new(MemoryStore::fixture(Utc::now())),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}

async fn seed(storage: StorageConfig, force: bool, policy: MergePolicy) -> Result<()> {
    let catalog_path = EntityType::Name.path(&storage);
    if catalog_path.exists() {
        if !force {
            bail!(
                "{} already exists; pass --force to replace it",
                catalog_path.display()
            );
        }
        for entity in [EntityType::Rating, EntityType::Selection] {
            let path = entity.path(&storage);
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("removing {}", path.display()))?;
            }
        }
    }

    let (names, ratings, selections) = MemoryStore::fixture(Utc::now()).snapshot().await;
    let store = JsonlStore::new(storage);
    let name_count = store.write_catalog(&names).await?;
    let rating_count = store.upsert_ratings(ratings, policy).await?;
    let selection_count = store.append_selections(selections).await?;

    println!("Seeded {}", store.config().data_dir.display());
    println!("Names:      {}", name_count);
    println!("Ratings:    {}", rating_count);
    println!("Selections: {}", selection_count);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_tracing(&config.log_level, cli.json_logs);
    tracing::info!("Starting name-rankings v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            let ttl = config.cache_ttl()?;
            let store = open_store(&config);
            tracing::info!(
                store = store.name(),
                merge_policy = %config.store.merge_policy,
                cache_ttl = ?ttl,
                "Store selected"
            );

            let state = AppState::new(store, config.store.merge_policy, ttl)
                .with_cors_origin(config.server.cors_origin.clone());
            let sweeper = spawn_sweeper(state.cache.clone(), ttl);

            let app = build_router(state);
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {}", addr))?;
            tracing::info!("Listening on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            sweeper.abort();
        }
        Commands::Seed { force } => {
            seed(
                StorageConfig::new(config.data_dir.clone()),
                force,
                config.store.merge_policy,
            )
            .await?;
        }
        Commands::Stats => {
            let store = open_store(&config);
            let stats = Aggregator::new(store).site_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
