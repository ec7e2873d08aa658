//! Zone monitor types

use crate::tracker::{BBox, Detection, Point, TrackedObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Restricted,
    Monitored,
    Entrance,
    Exit,
    Parking,
    Counting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Intrusion,
    Loitering,
    WrongWay,
    Overcrowd,
    ObjectLeft,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Intrusion => "intrusion",
            AlertType::Loitering => "loitering",
            AlertType::WrongWay => "wrong_way",
            AlertType::Overcrowd => "overcrowd",
            AlertType::ObjectLeft => "object_left",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local-time hour window `[start_hour, end_hour)`; wraps past midnight
/// when `start_hour > end_hour`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for ActiveHours {
    fn default() -> Self {
        Self { start_hour: 0, end_hour: 24 }
    }
}

impl ActiveHours {
    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = (self.start_hour as u32, self.end_hour as u32);
        if start <= end {
            start <= hour && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start_hour <= 23 && self.end_hour <= 24 && self.start_hour != self.end_hour
    }
}

fn default_max_people() -> u32 {
    10
}

fn default_max_time() -> u64 {
    300
}

/// A monitored polygon with thresholds and running counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: u64,
    pub name: String,
    pub zone_type: ZoneType,
    pub camera_id: String,
    pub points: Vec<Point>,
    #[serde(default = "default_max_people")]
    pub max_people: u32,
    /// Dwell seconds before loitering
    #[serde(default = "default_max_time")]
    pub max_time_secs: u64,
    #[serde(default)]
    pub active_hours: ActiveHours,
    #[serde(default)]
    pub current_count: u32,
    #[serde(default)]
    pub total_entries: u64,
    #[serde(default)]
    pub total_exits: u64,
    pub created_at: DateTime<Utc>,
}

/// Zone creation request
#[derive(Debug, Clone, Deserialize)]
pub struct NewZone {
    pub name: String,
    pub zone_type: ZoneType,
    pub camera_id: String,
    pub points: Vec<Point>,
    #[serde(default = "default_max_people")]
    pub max_people: u32,
    #[serde(default = "default_max_time")]
    pub max_time_secs: u64,
    #[serde(default)]
    pub active_hours: ActiveHours,
}

/// Who is inside a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubjectKey {
    Track(u64),
    External(String),
}

impl SubjectKey {
    /// Numeric track id when the subject comes from the tracker
    pub fn track_id(&self) -> Option<u64> {
        match self {
            SubjectKey::Track(id) => Some(*id),
            SubjectKey::External(_) => None,
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKey::Track(id) => write!(f, "track {}", id),
            SubjectKey::External(id) => write!(f, "{}", id),
        }
    }
}

/// Object evaluated against zones
#[derive(Debug, Clone)]
pub struct ZoneObject {
    pub subject: SubjectKey,
    pub class_label: String,
    pub bbox: BBox,
    pub confidence: Option<f64>,
}

impl From<&TrackedObject> for ZoneObject {
    fn from(obj: &TrackedObject) -> Self {
        Self {
            subject: SubjectKey::Track(obj.track_id),
            class_label: obj.class_label.clone(),
            bbox: obj.bbox,
            confidence: obj.confidence,
        }
    }
}

impl ZoneObject {
    /// Raw detections carry no identity unless an upstream tracker supplied one
    pub fn from_detection(detection: &Detection) -> Option<Self> {
        let hint = detection.external_track_hint.as_ref()?;
        Some(Self {
            subject: SubjectKey::External(hint.clone()),
            class_label: detection.class_label.clone(),
            bbox: detection.bbox,
            confidence: detection.confidence,
        })
    }
}

/// Presence of one subject inside one zone
#[derive(Debug, Clone)]
pub struct ZoneOccupancy {
    pub entered_at: DateTime<Utc>,
    pub last_bbox: BBox,
    pub loitering_alerted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneEvent {
    pub event_id: u64,
    pub zone_id: u64,
    pub camera_id: String,
    pub alert_type: AlertType,
    pub subject: Option<SubjectKey>,
    pub confidence: Option<f64>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZoneStats {
    pub zone_id: u64,
    pub name: String,
    pub zone_type: ZoneType,
    pub current_count: u32,
    pub total_entries: u64,
    pub total_exits: u64,
    pub events_count: usize,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ZoneSummary {
    pub total_zones: usize,
    pub active_zones: usize,
    pub total_people: u64,
    pub events_24h: usize,
    pub intrusions: usize,
    pub loitering: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_hours() {
        let all_day = ActiveHours::default();
        assert!(all_day.contains(0));
        assert!(all_day.contains(23));

        let office = ActiveHours { start_hour: 9, end_hour: 18 };
        assert!(office.contains(9));
        assert!(!office.contains(18));

        let night = ActiveHours { start_hour: 22, end_hour: 6 };
        assert!(night.contains(23));
        assert!(night.contains(2));
        assert!(!night.contains(6));
        assert!(!night.contains(12));

        assert!(!ActiveHours { start_hour: 5, end_hour: 5 }.is_valid());
        assert!(!ActiveHours { start_hour: 24, end_hour: 5 }.is_valid());
    }

    #[test]
    fn test_zone_defaults_from_json() {
        let zone: Zone = serde_json::from_str(
            r#"{
                "zone_id": 1, "name": "Door", "zone_type": "restricted", "camera_id": "cam-1",
                "points": [{"x":0,"y":0},{"x":10,"y":0},{"x":10,"y":10}],
                "created_at": "2024-03-05T10:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(zone.max_people, 10);
        assert_eq!(zone.max_time_secs, 300);
        assert_eq!(zone.active_hours, ActiveHours::default());
    }

    #[test]
    fn test_raw_detection_needs_hint() {
        let mut det = Detection {
            class_label: "person".to_string(),
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            camera_id: "cam-1".to_string(),
            external_track_hint: None,
            confidence: None,
        };
        assert!(ZoneObject::from_detection(&det).is_none());
        det.external_track_hint = Some("upstream-7".to_string());
        let obj = ZoneObject::from_detection(&det).unwrap();
        assert_eq!(obj.subject, SubjectKey::External("upstream-7".to_string()));
    }
}
