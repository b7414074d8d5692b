//! Zonewatch - Zone-Intrusion Surveillance Server
//!
//! Main entry point.

use zonewatch::{
    detection_adapter::HttpDetectionCapability,
    geofence_store::{
        FileGeofenceStore, GeofenceBackend, GeofenceStore, MemoryGeofenceStore, MySqlGeofenceStore,
    },
    state::{AppConfig, AppState},
    stream_monitor::FfmpegFrameSource,
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the configured geofence backend
async fn open_geofence_store(config: &AppConfig) -> anyhow::Result<Arc<dyn GeofenceStore>> {
    let store: Arc<dyn GeofenceStore> = match config.geofence_backend {
        GeofenceBackend::Memory => {
            tracing::warn!("Memory geofence backend selected, polygons are lost on restart");
            Arc::new(MemoryGeofenceStore::new())
        }
        GeofenceBackend::File => {
            Arc::new(FileGeofenceStore::new(config.polygon_data_dir.clone()).await?)
        }
        GeofenceBackend::MySql => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the mysql backend"))?;
            let pool = MySqlPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await?;
            tracing::info!("Database connected");
            Arc::new(MySqlGeofenceStore::new(pool).await?)
        }
    };

    tracing::info!(backend = store.backend(), "GeofenceStore initialized");
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zonewatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Zonewatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        video_dir = %config.video_dir.display(),
        alert_frame_dir = %config.alert_frame_dir.display(),
        geofence_backend = ?config.geofence_backend,
        detector_url = %config.detector_url,
        sample_interval_sec = config.sample_interval_secs,
        alert_policy = ?config.alert_policy,
        "Configuration loaded"
    );

    let geofences = open_geofence_store(&config).await?;

    let capability = Arc::new(HttpDetectionCapability::new(
        config.detector_url.clone(),
        config.detector_timeout,
    )?);
    let source = Arc::new(FfmpegFrameSource::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
    ));

    let state = AppState::build(config, geofences, capability, source).await?;
    tracing::info!(
        alert_dir = %state.alerts.alert_dir().display(),
        subject_class = %state.detector.subject_class(),
        "Components initialized"
    );

    if !state.detector.health_check().await {
        tracing::warn!(
            detector_url = %state.config.detector_url,
            "Detector not reachable yet, frames will be skipped until it is"
        );
    }

    // Start continuous monitoring
    if state.config.monitor_enabled {
        let started = state.supervisor.start().await?;
        tracing::info!(units = started, "MonitorSupervisor started");
    } else {
        tracing::info!("Continuous monitoring disabled");
    }

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.supervisor.shutdown().await;
    tracing::info!("Zonewatch stopped");

    Ok(())
}
