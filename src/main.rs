//! camwatch
//!
//! Main entry point.

use camwatch::{
    archive::{ArchiveCatalog, ArchiveIndex, InMemoryCatalog, MySqlArchiveCatalog},
    camera_connection::{ConnectionConfig, FfmpegStreamBackend},
    camera_registry::CameraRegistry,
    clip_extractor::{ClipExtractor, FfmpegTranscoder},
    clock::LocalClock,
    config_store::{CameraConfigSource, CameraRepository, StaticCameraSource},
    detection_pipeline::DetectionService,
    event_sink::{EventLogSink, EventSink, FanoutSink, MySqlEventSink},
    frame_extractor::FrameExtractor,
    recorder::{cleanup_old_archives, FfmpegWriterFactory, Recorder, RecorderConfig},
    state::{AppConfig, AppState},
    tracker::{TrackStore, TrackerConfig},
    web_api,
    zone_monitor::{ZoneFileStore, ZoneMonitor},
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
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
                .unwrap_or_else(|_| "camwatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camwatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        archive_root = %config.archive_root.display(),
        zones_file = %config.zones_file.display(),
        segment_duration_sec = config.segment_duration_sec,
        retention_days = config.retention_days,
        database = config.database_url.is_some(),
        "Configuration loaded"
    );

    // Optional database
    let pool = match &config.database_url {
        Some(url) => {
            let pool = MySqlPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await?;
            tracing::info!("Database connected");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using file and in-memory stores");
            None
        }
    };

    // 1. Camera configuration source
    let source: Arc<dyn CameraConfigSource> = match &pool {
        Some(pool) => Arc::new(CameraRepository::new(pool.clone())),
        None => Arc::new(StaticCameraSource::load(&config.cameras_file).await?),
    };

    // 2. CameraRegistry
    let connection_config = ConnectionConfig {
        connect_timeout: config.connect_timeout,
        read_timeout: config.read_timeout,
        ..ConnectionConfig::default()
    };
    let backend = Arc::new(FfmpegStreamBackend::new(&config.ffmpeg_path, &config.ffprobe_path));
    let registry = Arc::new(CameraRegistry::new(source.clone(), backend, connection_config));
    tracing::info!("CameraRegistry initialized");

    // 3. Archive + Recorder
    let layout = config.archive_layout();
    let catalog: Arc<dyn ArchiveCatalog> = match &pool {
        Some(pool) => Arc::new(MySqlArchiveCatalog::new(pool.clone())),
        None => Arc::new(InMemoryCatalog::new()),
    };
    let recorder = Arc::new(Recorder::new(
        registry.clone(),
        layout.clone(),
        catalog.clone(),
        Arc::new(FfmpegWriterFactory::new(&config.ffmpeg_path)),
        Arc::new(LocalClock),
        RecorderConfig {
            fps: config.record_fps,
            ..RecorderConfig::default()
        },
    ));
    tracing::info!("Recorder initialized");

    // 4. ClipExtractor + FrameExtractor
    let archive = ArchiveIndex::new(layout.clone());
    let transcoder = Arc::new(FfmpegTranscoder::new(&config.ffmpeg_path));
    let clips = Arc::new(ClipExtractor::new(archive.clone(), transcoder.clone()));
    let frames = Arc::new(FrameExtractor::new(archive.clone(), transcoder));

    // 5. Zones, events, detection pipelines
    let zones = Arc::new(ZoneMonitor::load(ZoneFileStore::new(&config.zones_file)).await?);
    let event_log = Arc::new(EventLogSink::default());
    let sink: Arc<dyn EventSink> = match &pool {
        Some(pool) => Arc::new(FanoutSink::new(vec![
            event_log.clone() as Arc<dyn EventSink>,
            Arc::new(MySqlEventSink::new(pool.clone())),
        ])),
        None => event_log.clone(),
    };
    let detections = Arc::new(DetectionService::new(
        Arc::new(TrackStore::default()),
        zones.clone(),
        sink,
        TrackerConfig::default(),
    ));
    tracing::info!("Detection pipeline initialized");

    // Start recorders
    if config.autostart_recording {
        match source.list_cameras().await {
            Ok(cameras) => {
                for camera in cameras.iter().filter(|c| c.recording_enabled) {
                    if let Err(e) = recorder.start(&camera.camera_id).await {
                        tracing::warn!(camera_id = %camera.camera_id, error = %e, "Recording not started");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to list cameras for autostart"),
        }
    }

    // Retention, hourly
    {
        let layout = layout.clone();
        let retention_days = config.retention_days;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let today = chrono::Local::now().date_naive();
                match cleanup_old_archives(&layout, retention_days, today).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Retention cleanup finished"),
                    Err(e) => tracing::error!(error = %e, "Retention cleanup failed"),
                }
            }
        });
    }

    let state = AppState {
        config: config.clone(),
        registry: registry.clone(),
        recorder: recorder.clone(),
        archive,
        catalog,
        clips,
        frames,
        detections,
        zones,
        event_log,
        db_connected: pool.is_some(),
        started_at: std::time::Instant::now(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = web_api::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush open segments before exit
    recorder.stop_all().await;
    registry.disconnect_all().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
