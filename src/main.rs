//! Motion-activated camera appliance
//!
//! Main entry point: wires the capture pipeline to the web API.

use motioncam::{
    camera::FfmpegCamera,
    capture_orchestrator::CaptureOrchestrator,
    config::Config,
    motion_detector::MotionDetector,
    recorder::ClipRecorder,
    state::{AppState, MotionStatus},
    storage::StorageManager,
    web_api,
};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "motioncam=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting motioncam v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        input = %config.camera.input,
        framerate = config.camera.framerate,
        data_dir = %config.storage.data_dir.display(),
        max_age_days = config.storage.max_age_days,
        max_disk_usage_mb = config.storage.max_disk_usage_mb,
        "Configuration loaded"
    );

    tokio::fs::create_dir_all(&config.storage.data_dir).await?;

    // Initialize components
    let storage = Arc::new(StorageManager::new(config.storage.clone()));
    tracing::info!("StorageManager initialized");

    let camera = Arc::new(FfmpegCamera::new(config.camera.clone()));
    let detector = MotionDetector::new(config.detection.clone());
    let recorder = ClipRecorder::new(
        camera.clone(),
        config.storage.data_dir.clone(),
        config.detection.max_clip_duration,
        config.camera.framerate,
    );
    tracing::info!("Capture pipeline initialized");

    let status = Arc::new(RwLock::new(MotionStatus::default()));
    let orchestrator = CaptureOrchestrator::new(
        camera,
        detector,
        recorder,
        storage.clone(),
        status.clone(),
        config.camera.framerate,
        config.detection.cooldown,
    );

    // Start capture loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let capture_handle = tokio::spawn(async move {
        if let Err(e) = orchestrator.run(shutdown_rx).await {
            tracing::error!(error = %e, "Capture loop terminated");
        }
    });

    // Create application state
    let state = AppState {
        config: config.clone(),
        storage,
        status,
    };

    // Create router with media file serving
    let app = web_api::create_router(state.clone())
        .nest_service("/media", ServeDir::new(&config.storage.data_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Finalize any in-progress recording before exiting
    shutdown_tx.send(true).ok();
    let _ = capture_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        return;
    }
    tracing::info!("Received shutdown signal");
}
