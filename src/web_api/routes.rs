//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Local, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::Error;
use crate::models::ApiResponse;
use crate::recorder::cleanup_old_archives;
use crate::state::AppState;
use crate::tracker::{Detection, TrackQuery};
use crate::zone_monitor::NewZone;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:id/connect", post(connect_camera))
        .route("/api/cameras/:id/test", post(test_camera))
        .route("/api/cameras/:id", delete(remove_camera))
        // Recording
        .route("/api/recordings", get(list_recordings))
        .route("/api/recordings/:camera_id/start", post(start_recording))
        .route("/api/recordings/:camera_id/stop", post(stop_recording))
        // Archive
        .route("/api/archive/cleanup", post(cleanup_archive))
        .route("/api/archive/:camera_id/segments", get(find_segments))
        .route("/api/archive/:camera_id/recent", get(recent_segments))
        .route("/api/archive/:camera_id/stats", get(archive_stats))
        .route("/api/archive/:camera_id/clip", post(extract_clip))
        .route("/api/archive/:camera_id/snapshot", get(archive_snapshot))
        .route("/api/archive/:camera_id/frames", get(archive_frames))
        // Zones
        .route("/api/zones", get(list_zones))
        .route("/api/zones", post(create_zone))
        .route("/api/zones/events", get(zone_events))
        .route("/api/zones/summary", get(zone_summary))
        .route("/api/zones/:id", get(get_zone))
        .route("/api/zones/:id", delete(delete_zone))
        .route("/api/zones/:id/stats", get(zone_stats))
        // Detection & tracking
        .route("/api/detections/:camera_id", post(submit_detections))
        .route("/api/tracks", get(list_tracks))
        .route("/api/tracks/search", get(search_tracks))
        .route("/api/tracks/summary", get(track_summary))
        .route("/api/tracks/correlate", get(correlate_tracks))
        .route("/api/tracks/:id", get(get_track))
        // Events
        .route("/api/events", get(list_events))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.registry.list().await))
}

async fn connect_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.registry.get_or_connect(&id).await.is_none() {
        return Error::Connection(format!("camera {} unavailable", id)).into_response();
    }
    match state.registry.info(&id).await {
        Some(info) => Json(ApiResponse::success(info)).into_response(),
        None => Error::NotFound(format!("camera {} not registered", id)).into_response(),
    }
}

async fn test_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::success(state.registry.test_camera(&id).await))
}

async fn remove_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    state.recorder.stop(&id).await;
    if state.registry.remove(&id).await {
        Json(json!({"ok": true})).into_response()
    } else {
        Error::NotFound(format!("camera {} not registered", id)).into_response()
    }
}

// ========================================
// Recording Handlers
// ========================================

async fn list_recordings(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.recorder.statuses().await))
}

async fn start_recording(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match state.recorder.start(&camera_id).await {
        Ok(()) => Json(ApiResponse::success(state.recorder.status(&camera_id).await)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn stop_recording(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    if state.recorder.stop(&camera_id).await {
        Json(json!({"ok": true})).into_response()
    } else {
        Error::NotFound(format!("camera {} is not recording", camera_id)).into_response()
    }
}

// ========================================
// Archive Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

async fn find_segments(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> impl IntoResponse {
    if range.end < range.start {
        return Error::Validation("end is before start".to_string()).into_response();
    }
    let segments = state
        .archive
        .find_segments(&camera_id, range.start, range.end)
        .await;
    Json(ApiResponse::success(segments)).into_response()
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn recent_segments(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).min(1000);
    match state.catalog.recent_segments(&camera_id, limit).await {
        Ok(segments) => Json(ApiResponse::success(segments)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn archive_stats(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::success(state.archive.stats(&camera_id).await))
}

async fn extract_clip(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Json(range): Json<RangeQuery>,
) -> impl IntoResponse {
    match state.clips.extract_clip(&camera_id, range.start, range.end).await {
        Some(path) => Json(ApiResponse::success(json!({ "path": path }))).into_response(),
        None => Error::NotFound(format!(
            "no recording for {} between {} and {}",
            camera_id, range.start, range.end
        ))
        .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotQuery {
    at: NaiveDateTime,
}

async fn archive_snapshot(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> impl IntoResponse {
    match state.frames.snapshot(&camera_id, query.at).await {
        Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
        None => Error::NotFound(format!("no recorded frame for {} at {}", camera_id, query.at))
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct FramesQuery {
    start: NaiveDateTime,
    end: NaiveDateTime,
    interval_secs: Option<f64>,
}

/// Frame timestamps and sizes; the images come from the snapshot route
async fn archive_frames(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Query(query): Query<FramesQuery>,
) -> impl IntoResponse {
    let secs = query.interval_secs.unwrap_or(2.0);
    let Ok(interval) = std::time::Duration::try_from_secs_f64(secs) else {
        return Error::Validation("interval_secs must be a positive number".to_string())
            .into_response();
    };
    match state
        .frames
        .extract_frames(&camera_id, query.start, query.end, interval)
        .await
    {
        Ok(frames) => Json(ApiResponse::success(frames)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn cleanup_archive(State(state): State<AppState>) -> impl IntoResponse {
    let layout = state.config.archive_layout();
    let today = Local::now().date_naive();
    match cleanup_old_archives(&layout, state.config.retention_days, today).await {
        Ok(removed) => Json(json!({"ok": true, "removed_days": removed})).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Zone Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct CameraFilter {
    camera_id: Option<String>,
}

async fn list_zones(
    State(state): State<AppState>,
    Query(filter): Query<CameraFilter>,
) -> impl IntoResponse {
    Json(ApiResponse::success(
        state.zones.zones(filter.camera_id.as_deref()).await,
    ))
}

async fn create_zone(
    State(state): State<AppState>,
    Json(req): Json<NewZone>,
) -> impl IntoResponse {
    match state.zones.create_zone(req).await {
        Ok(zone) => (StatusCode::CREATED, Json(ApiResponse::success(zone))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_zone(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    match state.zones.get_zone(id).await {
        Some(zone) => Json(ApiResponse::success(zone)).into_response(),
        None => Error::NotFound(format!("zone {}", id)).into_response(),
    }
}

async fn delete_zone(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    match state.zones.delete_zone(id).await {
        Ok(true) => Json(json!({"ok": true})).into_response(),
        Ok(false) => Error::NotFound(format!("zone {}", id)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn zone_stats(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    match state.zones.stats(id, Utc::now()).await {
        Some(stats) => Json(ApiResponse::success(stats)).into_response(),
        None => Error::NotFound(format!("zone {}", id)).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ZoneEventQuery {
    hours: Option<i64>,
    zone_id: Option<u64>,
}

async fn zone_events(
    State(state): State<AppState>,
    Query(query): Query<ZoneEventQuery>,
) -> impl IntoResponse {
    let hours = query.hours.unwrap_or(24).clamp(1, 24 * 30);
    Json(ApiResponse::success(
        state.zones.recent_events(hours, query.zone_id, Utc::now()).await,
    ))
}

async fn zone_summary(
    State(state): State<AppState>,
    Query(filter): Query<CameraFilter>,
) -> impl IntoResponse {
    Json(ApiResponse::success(
        state.zones.summary(filter.camera_id.as_deref(), Utc::now()).await,
    ))
}

// ========================================
// Detection & Track Handlers
// ========================================

async fn submit_detections(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
    Json(detections): Json<Vec<Detection>>,
) -> impl IntoResponse {
    let result = state
        .detections
        .process_batch(&camera_id, &detections, Utc::now())
        .await;
    Json(ApiResponse::success(result))
}

#[derive(Debug, Deserialize)]
struct TrackFilter {
    camera_id: Option<String>,
    class_label: Option<String>,
}

async fn list_tracks(
    State(state): State<AppState>,
    Query(filter): Query<TrackFilter>,
) -> impl IntoResponse {
    Json(ApiResponse::success(
        state
            .detections
            .active_tracks(filter.camera_id.as_deref(), filter.class_label.as_deref())
            .await,
    ))
}

async fn search_tracks(
    State(state): State<AppState>,
    Query(query): Query<TrackQuery>,
) -> impl IntoResponse {
    Json(ApiResponse::success(state.detections.search(&query).await))
}

async fn track_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.detections.summaries().await))
}

async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    match state.detections.get_track(id).await {
        Some(track) => Json(ApiResponse::success(track)).into_response(),
        None => Error::NotFound(format!("track {}", id)).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CorrelateQuery {
    camera_a: String,
    camera_b: String,
    window_secs: Option<f64>,
}

async fn correlate_tracks(
    State(state): State<AppState>,
    Query(query): Query<CorrelateQuery>,
) -> impl IntoResponse {
    let window = query.window_secs.unwrap_or(60.0);
    Json(ApiResponse::success(
        state
            .detections
            .cross_camera_matches(&query.camera_a, &query.camera_b, window)
            .await,
    ))
}

// ========================================
// Event Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct EventQuery {
    limit: Option<usize>,
    camera_id: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(100).min(1000);
    Json(ApiResponse::success(
        state.event_log.latest(limit, query.camera_id.as_deref()).await,
    ))
}
