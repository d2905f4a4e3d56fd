//! Fingerprint Recognition Service
//!
//! Enrollment and recognition of fingerprint scans backed by a
//! segmentation model, a recognition feature extractor, and a file-backed
//! embeddings store.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fingerid::api::rest::{create_rest_router, AppState};
use fingerid::config::Config;
use fingerid::engine::ModelCache;
use fingerid::service::FingerprintService;
use fingerid::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!(
        "Starting Fingerprint Recognition Service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration
    let config = Config::load(Config::default_path()).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  Port: {}", config.server.port);
    info!("  Device: {}", config.inference.device);
    info!("  Models dir: {:?}", config.models.models_dir);
    info!("  Model idle timeout: {}s", config.inference.model_idle_timeout);
    info!(
        "  Similarity threshold: {}",
        config.recognition.similarity_threshold
    );

    // Initialize model cache
    let models = Arc::new(ModelCache::new(
        &config.inference,
        &config.models.models_dir,
    )?);

    // Start model cleanup task
    let models_clone = models.clone();
    tokio::spawn(async move {
        models_clone.start_cleanup_task().await;
    });

    // Initialize embeddings store
    let store = Arc::new(FileStore::open(&config.storage.embeddings_dir)?);

    // Create fingerprint service
    let service = Arc::new(FingerprintService::new(
        models.clone(),
        store,
        config.clone(),
    ));

    let app_state = Arc::new(AppState { service });
    let router = create_rest_router(app_state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    info!("REST API listening on http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    models.shutdown();
    info!("Goodbye!");
    Ok(())
}
