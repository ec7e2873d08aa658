//! Application state
//!
//! Holds all shared components and state

use crate::archive::{ArchiveCatalog, ArchiveIndex, ArchiveLayout};
use crate::camera_registry::CameraRegistry;
use crate::clip_extractor::ClipExtractor;
use crate::detection_pipeline::DetectionService;
use crate::event_sink::EventLogSink;
use crate::frame_extractor::FrameExtractor;
use crate::recorder::Recorder;
use crate::zone_monitor::ZoneMonitor;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// MySQL URL; in-memory collaborators are used when absent
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    /// Root of the segment archive
    pub archive_root: PathBuf,
    /// Zone definitions file
    pub zones_file: PathBuf,
    /// Camera list used when no database is configured
    pub cameras_file: PathBuf,
    pub segment_duration_sec: u64,
    pub retention_days: u32,
    pub record_fps: u32,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Start recorders for cameras with recording enabled at boot
    pub autostart_recording: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080),
            archive_root: std::env::var("ARCHIVE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/camwatch/videos")),
            zones_file: std::env::var("ZONES_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/camwatch/zones.json")),
            cameras_file: std::env::var("CAMERAS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/etc/camwatch/cameras.json")),
            segment_duration_sec: env_or("SEGMENT_DURATION_SEC", 600),
            retention_days: env_or("RETENTION_DAYS", 30),
            record_fps: env_or("RECORD_FPS", 15),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            connect_timeout: Duration::from_secs(env_or("CONNECT_TIMEOUT_SEC", 10)),
            read_timeout: Duration::from_millis(env_or("READ_TIMEOUT_MS", 5000)),
            autostart_recording: env_or("AUTOSTART_RECORDING", true),
        }
    }
}

impl AppConfig {
    pub fn archive_layout(&self) -> ArchiveLayout {
        ArchiveLayout::new(&self.archive_root, "mp4", self.segment_duration_sec)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<CameraRegistry>,
    pub recorder: Arc<Recorder>,
    pub archive: ArchiveIndex,
    pub catalog: Arc<dyn ArchiveCatalog>,
    pub clips: Arc<ClipExtractor>,
    pub frames: Arc<FrameExtractor>,
    pub detections: Arc<DetectionService>,
    pub zones: Arc<ZoneMonitor>,
    pub event_log: Arc<EventLogSink>,
    pub db_connected: bool,
    pub started_at: std::time::Instant,
}
