//! Tracker - frame-to-frame identity for detections of one camera
//!
//! ## Algorithm
//!
//! Per batch, each detection takes the unconsumed active track of the same
//! class with the highest IOU against the track's latest box; the match is
//! accepted when IOU exceeds the threshold. Unmatched detections start new
//! tracks. Unmatched tracks idle for `max_age` seconds or more are moved to
//! the shared completed archive, exactly once.

mod store;
mod types;

pub use store::{correlate, TrackStore, DEFAULT_COMPLETED_CAPACITY};
pub use types::{
    BBox, CrossCameraMatch, Detection, Point, Sample, Track, TrackQuery, TrackState,
    TrackedObject, TrackerSummary,
};

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub iou_threshold: f64,
    /// Idle seconds before a track is completed
    pub max_age_secs: f64,
    /// Samples retained per track
    pub max_samples: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_age_secs: 30.0,
            max_samples: 100,
        }
    }
}

/// Tracker for one camera
pub struct MultiObjectTracker {
    camera_id: String,
    config: TrackerConfig,
    store: Arc<TrackStore>,
    // Insertion order keeps matching deterministic
    active: Vec<Track>,
    batch_count: u64,
}

impl MultiObjectTracker {
    pub fn new(camera_id: impl Into<String>, config: TrackerConfig, store: Arc<TrackStore>) -> Self {
        Self {
            camera_id: camera_id.into(),
            config,
            store,
            active: Vec::new(),
            batch_count: 0,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn store(&self) -> &Arc<TrackStore> {
        &self.store
    }

    /// Process one detection batch; returns the objects observed in it
    pub async fn update(&mut self, detections: &[Detection], now: DateTime<Utc>) -> Vec<TrackedObject> {
        self.batch_count += 1;

        let mut consumed: HashSet<usize> = HashSet::new();
        let mut observed = Vec::with_capacity(detections.len());

        for detection in detections {
            let mut best: Option<(usize, f64)> = None;
            for (idx, track) in self.active.iter().enumerate() {
                if consumed.contains(&idx) || track.class_label != detection.class_label {
                    continue;
                }
                let Some(last) = track.bbox() else {
                    continue;
                };
                let iou = last.iou(&detection.bbox);
                if iou > self.config.iou_threshold && best.map_or(true, |(_, b)| iou > b) {
                    best = Some((idx, iou));
                }
            }

            let idx = match best {
                Some((idx, _)) => {
                    self.active[idx].push(detection.bbox, now);
                    idx
                }
                None => {
                    let track_id = self.store.allocate_id();
                    self.active.push(Track::new(track_id, detection, now, self.config.max_samples));
                    tracing::debug!(camera_id = %self.camera_id, track_id, class = %detection.class_label, "Track started");
                    self.active.len() - 1
                }
            };
            consumed.insert(idx);

            let track = &self.active[idx];
            observed.push(TrackedObject {
                track_id: track.track_id,
                class_label: track.class_label.clone(),
                bbox: detection.bbox,
                camera_id: self.camera_id.clone(),
                confidence: detection.confidence,
            });
        }

        self.age_out(&consumed, now).await;
        observed
    }

    async fn age_out(&mut self, consumed: &HashSet<usize>, now: DateTime<Utc>) {
        let max_age_ms = (self.config.max_age_secs * 1000.0) as i64;
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(self.active.len());

        for (idx, track) in self.active.drain(..).enumerate() {
            let idle_ms = (now - track.last_seen).num_milliseconds();
            if !consumed.contains(&idx) && idle_ms >= max_age_ms {
                expired.push(track);
            } else {
                kept.push(track);
            }
        }
        self.active = kept;

        if !expired.is_empty() {
            tracing::debug!(camera_id = %self.camera_id, count = expired.len(), "Tracks completed");
            self.store.complete(expired).await;
        }
    }

    /// Active tracks, optionally restricted to one class
    pub fn active_tracks(&self, class_filter: Option<&str>) -> Vec<&Track> {
        self.active
            .iter()
            .filter(|t| class_filter.map_or(true, |c| t.class_label == c))
            .collect()
    }

    /// Active track by id
    pub fn get_track(&self, track_id: u64) -> Option<&Track> {
        self.active.iter().find(|t| t.track_id == track_id)
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_count
    }

    pub async fn summary(&self) -> TrackerSummary {
        let mut by_class = BTreeMap::new();
        for track in &self.active {
            *by_class.entry(track.class_label.clone()).or_insert(0) += 1;
        }
        let completed = self.store.completed_for(&self.camera_id).await.len();
        TrackerSummary {
            active_tracks: self.active.len(),
            total_tracked: completed + self.active.len(),
            by_class,
            batch_count: self.batch_count,
        }
    }
}
