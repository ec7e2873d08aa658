//! DetectionPipeline - Tracker -> ZoneMonitor -> EventSink per camera
//!
//! ## Responsibilities
//!
//! - One pipeline per camera, batches for a camera are processed in order
//! - Different cameras run independently
//! - Sink failures are logged and never fail the batch
//! - Track queries across all cameras (active + completed)

use crate::event_sink::{EventSink, SinkEvent};
use crate::tracker::{
    correlate, CrossCameraMatch, Detection, MultiObjectTracker, Track, TrackQuery, TrackStore,
    TrackedObject, TrackerConfig, TrackerSummary,
};
use crate::zone_monitor::{ZoneEvent, ZoneMonitor, ZoneObject};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Outcome of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub objects: Vec<TrackedObject>,
    pub events: Vec<ZoneEvent>,
}

/// Pipeline for one camera
pub struct DetectionPipeline {
    tracker: MultiObjectTracker,
    zones: Arc<ZoneMonitor>,
    sink: Arc<dyn EventSink>,
}

impl DetectionPipeline {
    pub fn new(tracker: MultiObjectTracker, zones: Arc<ZoneMonitor>, sink: Arc<dyn EventSink>) -> Self {
        Self { tracker, zones, sink }
    }

    pub fn camera_id(&self) -> &str {
        self.tracker.camera_id()
    }

    pub fn tracker(&self) -> &MultiObjectTracker {
        &self.tracker
    }

    pub async fn process(&mut self, detections: &[Detection], now: DateTime<Utc>) -> BatchResult {
        let camera_id = self.tracker.camera_id().to_string();
        let own: Vec<Detection> = detections
            .iter()
            .filter(|d| {
                let ok = d.camera_id == camera_id;
                if !ok {
                    tracing::warn!(camera_id = %camera_id, other = %d.camera_id, "Detection for another camera skipped");
                }
                ok
            })
            .cloned()
            .collect();

        let objects = self.tracker.update(&own, now).await;
        let zone_objects: Vec<ZoneObject> = objects.iter().map(ZoneObject::from).collect();
        let events = self.zones.process_frame(&camera_id, &zone_objects, now).await;

        for event in &events {
            let sink_event = SinkEvent {
                camera_id: event.camera_id.clone(),
                event_type: event.alert_type.to_string(),
                subject_track_id: event.subject.as_ref().map(|s| match s.track_id() {
                    Some(id) => id.to_string(),
                    None => s.to_string(),
                }),
                confidence: event.confidence,
                description: event.description.clone(),
                timestamp: event.timestamp,
            };
            if let Err(e) = self.sink.emit_event(&sink_event).await {
                tracing::error!(camera_id = %camera_id, event_id = event.event_id, error = %e, "Failed to emit event");
            }
        }

        tracing::debug!(
            camera_id = %camera_id,
            detections = own.len(),
            objects = objects.len(),
            events = events.len(),
            "Batch processed"
        );
        BatchResult { objects, events }
    }
}

/// All camera pipelines
pub struct DetectionService {
    pipelines: RwLock<HashMap<String, Arc<Mutex<DetectionPipeline>>>>,
    store: Arc<TrackStore>,
    zones: Arc<ZoneMonitor>,
    sink: Arc<dyn EventSink>,
    config: TrackerConfig,
}

impl DetectionService {
    pub fn new(
        store: Arc<TrackStore>,
        zones: Arc<ZoneMonitor>,
        sink: Arc<dyn EventSink>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            store,
            zones,
            sink,
            config,
        }
    }

    pub fn zones(&self) -> &Arc<ZoneMonitor> {
        &self.zones
    }

    pub fn store(&self) -> &Arc<TrackStore> {
        &self.store
    }

    async fn pipeline(&self, camera_id: &str) -> Arc<Mutex<DetectionPipeline>> {
        if let Some(p) = self.pipelines.read().await.get(camera_id) {
            return p.clone();
        }
        let mut pipelines = self.pipelines.write().await;
        pipelines
            .entry(camera_id.to_string())
            .or_insert_with(|| {
                tracing::info!(camera_id = %camera_id, "Detection pipeline created");
                Arc::new(Mutex::new(DetectionPipeline::new(
                    MultiObjectTracker::new(camera_id, self.config.clone(), self.store.clone()),
                    self.zones.clone(),
                    self.sink.clone(),
                )))
            })
            .clone()
    }

    async fn all(&self) -> Vec<Arc<Mutex<DetectionPipeline>>> {
        self.pipelines.read().await.values().cloned().collect()
    }

    /// Run one detection batch for a camera
    pub async fn process_batch(&self, camera_id: &str, detections: &[Detection], now: DateTime<Utc>) -> BatchResult {
        let pipeline = self.pipeline(camera_id).await;
        let mut pipeline = pipeline.lock().await;
        pipeline.process(detections, now).await
    }

    /// Active tracks, optionally filtered by camera and class
    pub async fn active_tracks(&self, camera_id: Option<&str>, class_filter: Option<&str>) -> Vec<Track> {
        let mut tracks = Vec::new();
        for pipeline in self.all().await {
            let pipeline = pipeline.lock().await;
            if camera_id.map_or(true, |c| pipeline.camera_id() == c) {
                tracks.extend(pipeline.tracker().active_tracks(class_filter).into_iter().cloned());
            }
        }
        tracks.sort_by_key(|t| t.track_id);
        tracks
    }

    /// Active or completed track by id
    pub async fn get_track(&self, track_id: u64) -> Option<Track> {
        for pipeline in self.all().await {
            if let Some(track) = pipeline.lock().await.tracker().get_track(track_id) {
                return Some(track.clone());
            }
        }
        self.store.get_completed(track_id).await
    }

    /// Active and completed tracks matching the query, most recently seen first
    pub async fn search(&self, query: &TrackQuery) -> Vec<Track> {
        let mut results: Vec<Track> = self
            .active_tracks(query.camera_id.as_deref(), None)
            .await
            .into_iter()
            .filter(|t| query.matches(t))
            .collect();
        results.extend(self.store.search_completed(query).await);
        results.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        results
    }

    /// Per-camera tracker summaries
    pub async fn summaries(&self) -> BTreeMap<String, TrackerSummary> {
        let mut out = BTreeMap::new();
        for pipeline in self.all().await {
            let pipeline = pipeline.lock().await;
            out.insert(pipeline.camera_id().to_string(), pipeline.tracker().summary().await);
        }
        out
    }

    /// Tracks that ended on `camera_a` paired with tracks that began on `camera_b`
    pub async fn cross_camera_matches(&self, camera_a: &str, camera_b: &str, window_secs: f64) -> Vec<CrossCameraMatch> {
        let a_tracks = self.store.completed_for(camera_a).await;
        let mut b_tracks = self.store.completed_for(camera_b).await;
        b_tracks.extend(self.active_tracks(Some(camera_b), None).await);
        correlate(&a_tracks, &b_tracks, window_secs)
    }
}
