mod handlers;
mod routes;
mod seed;

use anyhow::{Context, Result};
use arena_common::config::Config;
use arena_common::languages::LanguageConfigManager;
use arena_common::redis::RedisStore;
use arena_common::store::{MemoryStore, SubmissionStore};
use arena_judge::engine::DockerEngine;
use arena_judge::metrics;
use arena_judge::queue::SubmissionQueue;
use arena_judge::worker::{self, WorkerSettings};
use axum::Router;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub store: Arc<dyn SubmissionStore>,
    pub queue: SubmissionQueue,
    pub default_competition: String,
}

#[derive(Parser)]
#[command(name = "arena-server")]
#[command(about = "Arena - coding problems, sandboxed judging and leaderboards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Shared Redis store (REDIS_URL)
    Redis,
    /// Process-local store, lost on exit
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the judge workers
    Serve {
        /// Address to listen on (overrides BIND_ADDR)
        #[arg(short, long)]
        bind: Option<String>,

        /// Number of concurrent workers (overrides WORKER_COUNT)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Storage backend
        #[arg(long, value_enum, env = "ARENA_STORE", default_value_t = StoreKind::Redis)]
        store: StoreKind,

        /// Do not create the sample problems on an empty store
        #[arg(long, default_value = "false")]
        no_seed: bool,
    },

    /// Create the sample problems in Redis if it holds none
    Seed,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = Config::from_env().context("Invalid configuration")?;

    match cli.command.unwrap_or(Commands::Serve {
        bind: None,
        workers: None,
        store: StoreKind::Redis,
        no_seed: false,
    }) {
        Commands::Serve {
            bind,
            workers,
            store,
            no_seed,
        } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(workers) = workers {
                config.worker_count = workers.max(1);
            }
            serve(config, store, !no_seed).await
        }
        Commands::Seed => {
            let store = RedisStore::connect(&config.redis_url).await?;
            let created = seed::seed_problems(&store).await?;
            info!(created, "Seeding finished");
            Ok(())
        }
    }
}

async fn open_store(kind: StoreKind, config: &Config) -> Result<Arc<dyn SubmissionStore>> {
    match kind {
        StoreKind::Redis => {
            let store = RedisStore::connect(&config.redis_url).await?;
            info!(redis_url = %config.redis_url, "Connected to Redis");
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            warn!("Using in-memory store, data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn serve(config: Config, store_kind: StoreKind, seed: bool) -> Result<()> {
    info!("Arena server booting...");

    let languages = LanguageConfigManager::load(&config.languages_config).map_err(|e| {
        error!("Failed to load language configurations: {:#}", e);
        error!("Make sure {} exists", config.languages_config.display());
        e
    })?;
    info!(languages = ?languages.list_languages(), "Loaded language configurations");

    let store = open_store(store_kind, &config).await?;
    if seed {
        seed::seed_problems(store.as_ref()).await?;
    }

    let engine = DockerEngine::connect().context("Failed to create Docker client")?;
    if let Err(e) = engine.ping().await {
        // Keep serving; submissions complete with a diagnostic until Docker is back
        warn!(error = %e, "Docker daemon not reachable");
    }

    metrics::register();

    let queue = SubmissionQueue::bounded(config.queue_capacity);
    let settings = WorkerSettings {
        execution_timeout: config.execution_timeout,
        evaluation_delay: config.evaluation_delay,
    };
    let workers = worker::spawn_pool(
        config.worker_count,
        &queue,
        store.clone(),
        Arc::new(engine),
        Arc::new(languages),
        settings,
    );
    info!(
        workers = workers.len(),
        queue_capacity = config.queue_capacity,
        timeout_ms = config.execution_timeout.as_millis() as u64,
        "Worker pool started"
    );

    let state = Arc::new(AppState {
        store,
        queue: queue.clone(),
        default_competition: config.default_competition.clone(),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("HTTP server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Workers finish what they hold; anything still queued stays pending
    queue.close();
    let abandoned = queue.drain();
    if !abandoned.is_empty() {
        warn!(count = abandoned.len(), ids = ?abandoned, "Queued submissions left pending");
    }
    for handle in workers {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task failed");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => warn!("Received shutdown signal, stopping..."),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
