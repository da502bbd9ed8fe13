use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use helios_core::{
    load_config, validate_config, CatalogClient, CommandTransformer, DiscoveryScheduler,
    DownloadWorker, InMemoryBroker, ManifestStore, OpenSearchCatalog, ProcessWorker,
    SqliteManifestStore, TaskQueue, Transformer, WorkerPool,
};

use helios_server::api::create_router;
use helios_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("HELIOS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Catalog collection: {}", config.catalog.collection);
    info!(
        "Discovery: every {} min, {} min window ending {} h in the past, ROI {}",
        config.discovery.interval_minutes,
        config.discovery.lookback_minutes,
        config.discovery.min_age_hours,
        config.discovery.roi.name
    );

    // Log a config fingerprint so deployments are distinguishable without
    // leaking secrets.
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Config hash: {}", &config_hash[..16]);

    // Create SQLite manifest store
    let manifest: Arc<dyn ManifestStore> = Arc::new(
        SqliteManifestStore::new(&config.database.path)
            .context("Failed to create manifest store")?,
    );
    info!("Manifest store initialized");

    // Create task broker
    let queue: Arc<dyn TaskQueue> = Arc::new(InMemoryBroker::new());
    info!("Task broker initialized");

    // Create catalog client
    let catalog: Arc<dyn CatalogClient> =
        Arc::new(OpenSearchCatalog::new(config.catalog.clone()));
    info!("Catalog client initialized for {}", config.catalog.url);

    // Create transformer
    let transformer: Arc<dyn Transformer> = Arc::new(CommandTransformer::new(
        config.processing.tool_path.clone(),
        config.quality.clone(),
    ));
    info!(
        "Transformer initialized: {:?}",
        config.processing.tool_path
    );

    // Create worker pools
    let download_worker = Arc::new(DownloadWorker::new(
        &config.download,
        config.storage.raw_dir.clone(),
        Arc::clone(&manifest),
        Arc::clone(&queue),
        Arc::clone(&catalog),
    ));
    let download_pool = WorkerPool::new(
        Arc::clone(&queue),
        download_worker,
        config.download.workers,
    );
    download_pool.start();
    info!(
        "Download worker pool started ({} members)",
        config.download.workers
    );

    let process_worker = Arc::new(ProcessWorker::new(
        &config.processing,
        config.storage.output_dir.clone(),
        Arc::clone(&manifest),
        Arc::clone(&transformer),
    ));
    let process_pool = WorkerPool::new(
        Arc::clone(&queue),
        process_worker,
        config.processing.workers,
    );
    process_pool.start();
    info!(
        "Process worker pool started ({} members)",
        config.processing.workers
    );

    // Create and start the discovery scheduler
    let scheduler = Arc::new(DiscoveryScheduler::new(
        config.discovery.clone(),
        Arc::clone(&manifest),
        Arc::clone(&queue),
        Arc::clone(&catalog),
    ));
    scheduler.start();
    info!("Discovery scheduler started");

    // Register metrics
    let registry = prometheus::Registry::new();
    for metric in helios_core::metrics::all_metrics() {
        registry
            .register(metric)
            .context("Failed to register metrics")?;
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&manifest),
        Arc::clone(&queue),
        Arc::clone(&scheduler),
        registry,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop pipeline components; in-flight tasks finish, unacked ones
    // re-deliver on the next start.
    info!("Server shutting down...");
    scheduler.stop();
    download_pool.stop();
    process_pool.stop();
    info!("Pipeline stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
