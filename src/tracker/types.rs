//! Tracker types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Axis-aligned box, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Image-space point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl BBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f64 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn centroid(&self) -> Point {
        Point {
            x: self.x + self.w / 2.0,
            y: self.y + self.h / 2.0,
        }
    }

    /// Intersection over union, 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &BBox) -> f64 {
        let ix = (self.x + self.w).min(other.x + other.w) - self.x.max(other.x);
        let iy = (self.y + self.h).min(other.y + other.h) - self.y.max(other.y);
        if ix <= 0.0 || iy <= 0.0 {
            return 0.0;
        }
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// One detector output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub bbox: BBox,
    pub camera_id: String,
    /// Identity assigned by an upstream tracker, if any
    #[serde(default)]
    pub external_track_hint: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Position sample
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Sample {
    pub bbox: BBox,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Active,
    Completed,
}

/// Identity of one object across detection batches
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub track_id: u64,
    pub class_label: String,
    pub camera_id: String,
    pub state: TrackState,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    samples: VecDeque<Sample>,
    distance: f64,
    #[serde(skip)]
    max_samples: usize,
}

impl Track {
    pub(crate) fn new(
        track_id: u64,
        detection: &Detection,
        now: DateTime<Utc>,
        max_samples: usize,
    ) -> Self {
        let mut samples = VecDeque::with_capacity(max_samples.min(16));
        samples.push_back(Sample { bbox: detection.bbox, timestamp: now });
        Self {
            track_id,
            class_label: detection.class_label.clone(),
            camera_id: detection.camera_id.clone(),
            state: TrackState::Active,
            first_seen: now,
            last_seen: now,
            samples,
            distance: 0.0,
            max_samples: max_samples.max(1),
        }
    }

    /// Append a matched position; the oldest sample is dropped past the bound
    pub(crate) fn push(&mut self, bbox: BBox, now: DateTime<Utc>) {
        if let Some(last) = self.samples.back() {
            self.distance += last.bbox.centroid().distance(&bbox.centroid());
        }
        self.samples.push_back(Sample { bbox, timestamp: now });
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        self.last_seen = now;
    }

    pub fn is_active(&self) -> bool {
        self.state == TrackState::Active
    }

    pub fn samples(&self) -> &VecDeque<Sample> {
        &self.samples
    }

    /// Most recent box
    pub fn bbox(&self) -> Option<BBox> {
        self.samples.back().map(|s| s.bbox)
    }

    /// Centroids of the retained samples, oldest first
    pub fn path(&self) -> Vec<Point> {
        self.samples.iter().map(|s| s.bbox.centroid()).collect()
    }

    /// Centroid distance travelled since creation (pixels)
    pub fn total_distance(&self) -> f64 {
        self.distance
    }

    /// Seconds between first and last sighting
    pub fn duration(&self) -> f64 {
        (self.last_seen - self.first_seen).num_milliseconds() as f64 / 1000.0
    }

    /// Pixels per second
    pub fn average_speed(&self) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            0.0
        } else {
            self.distance / duration
        }
    }
}

/// Object seen in the current batch
#[derive(Debug, Clone, Serialize)]
pub struct TrackedObject {
    pub track_id: u64,
    pub class_label: String,
    pub bbox: BBox,
    pub camera_id: String,
    pub confidence: Option<f64>,
}

/// Tracker counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerSummary {
    pub active_tracks: usize,
    pub total_tracked: usize,
    pub by_class: std::collections::BTreeMap<String, usize>,
    pub batch_count: u64,
}

/// Filter for track search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackQuery {
    pub class_label: Option<String>,
    pub min_duration: Option<f64>,
    pub camera_id: Option<String>,
}

impl TrackQuery {
    pub fn matches(&self, track: &Track) -> bool {
        if let Some(class) = &self.class_label {
            if &track.class_label != class {
                return false;
            }
        }
        if let Some(min) = self.min_duration {
            if track.duration() < min {
                return false;
            }
        }
        if let Some(camera) = &self.camera_id {
            if &track.camera_id != camera {
                return false;
            }
        }
        true
    }
}

/// Candidate pairing of tracks seen on two cameras
#[derive(Debug, Clone, Serialize)]
pub struct CrossCameraMatch {
    pub class_label: String,
    pub track_a: u64,
    pub track_b: u64,
    pub a_last_seen: DateTime<Utc>,
    pub b_first_seen: DateTime<Utc>,
    pub gap_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iou_identical_is_one() {
        let a = BBox::new(10.0, 10.0, 50.0, 40.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 10.0, 10.0);
        let touching = BBox::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&touching), 0.0);
    }

    #[test]
    fn test_iou_symmetric_and_partial() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 10.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(a.iou(&b), b.iou(&a));
    }

    #[test]
    fn test_track_samples_bounded_and_stats() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let det = Detection {
            class_label: "person".to_string(),
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
            camera_id: "cam-1".to_string(),
            external_track_hint: None,
            confidence: None,
        };
        let mut track = Track::new(1, &det, t0, 3);
        for i in 1..=4 {
            let bbox = BBox::new(i as f64 * 3.0, i as f64 * 4.0, 10.0, 10.0);
            track.push(bbox, t0 + chrono::Duration::seconds(i));
        }

        assert_eq!(track.samples().len(), 3);
        assert_eq!(track.path()[0], Point { x: 11.0, y: 13.0 });
        assert!((track.total_distance() - 20.0).abs() < 1e-9);
        assert!((track.duration() - 4.0).abs() < 1e-9);
        assert!((track.average_speed() - 5.0).abs() < 1e-9);
    }
}
