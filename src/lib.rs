//! camwatch - continuous camera recording and zone alerting
//!
//! ## Architecture
//!
//! 1. ConfigStore - camera records (MySQL or JSON file)
//! 2. CameraConnection - one RTSP stream, bounded reads, reconnect
//! 3. CameraRegistry - one connection per camera id
//! 4. Recorder - per-camera segment recording loop + retention
//! 5. Archive - segment layout, range lookup, catalog
//! 6. ClipExtractor - trim/concat through a Transcoder
//!    FrameExtractor - JPEG stills from the archive
//! 7. Tracker - IOU multi-object tracking
//! 8. ZoneMonitor - polygon zones and alerts
//! 9. EventSink - outbound events
//! 10. DetectionPipeline - Tracker -> ZoneMonitor -> EventSink
//! 11. WebAPI - REST API endpoints

pub mod archive;
pub mod camera_connection;
pub mod camera_registry;
pub mod clip_extractor;
pub mod clock;
pub mod config_store;
pub mod detection_pipeline;
pub mod error;
pub mod event_sink;
pub mod frame_extractor;
pub mod models;
pub mod recorder;
pub mod state;
pub mod tracker;
pub mod web_api;
pub mod zone_monitor;

pub use error::{Error, Result};
pub use state::AppState;
