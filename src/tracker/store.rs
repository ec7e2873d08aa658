//! Shared track state: id allocation and the completed-track archive
//!
//! Every per-camera tracker allocates ids from one store so ids are unique
//! across cameras and never reused.

use super::types::{CrossCameraMatch, Track, TrackQuery, TrackState};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Default completed archive capacity
pub const DEFAULT_COMPLETED_CAPACITY: usize = 1000;

pub struct TrackStore {
    next_id: AtomicU64,
    completed: RwLock<VecDeque<Track>>,
    capacity: usize,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETED_CAPACITY)
    }
}

impl TrackStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            completed: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Archive aged-out tracks; the oldest are dropped past capacity
    pub(crate) async fn complete(&self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            return;
        }
        let mut completed = self.completed.write().await;
        for mut track in tracks {
            track.state = TrackState::Completed;
            completed.push_back(track);
        }
        while completed.len() > self.capacity {
            completed.pop_front();
        }
    }

    pub async fn completed_count(&self) -> usize {
        self.completed.read().await.len()
    }

    pub async fn completed_for(&self, camera_id: &str) -> Vec<Track> {
        self.completed
            .read()
            .await
            .iter()
            .filter(|t| t.camera_id == camera_id)
            .cloned()
            .collect()
    }

    pub async fn get_completed(&self, track_id: u64) -> Option<Track> {
        self.completed
            .read()
            .await
            .iter()
            .find(|t| t.track_id == track_id)
            .cloned()
    }

    pub async fn search_completed(&self, query: &TrackQuery) -> Vec<Track> {
        self.completed
            .read()
            .await
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect()
    }
}

/// Pair tracks ending on camera A with same-class tracks starting on camera B
/// within `window_secs`, smallest gap first. Advisory only.
pub fn correlate(a_tracks: &[Track], b_tracks: &[Track], window_secs: f64) -> Vec<CrossCameraMatch> {
    let mut matches = Vec::new();
    for a in a_tracks {
        for b in b_tracks {
            if a.track_id == b.track_id || a.class_label != b.class_label {
                continue;
            }
            let gap = (b.first_seen - a.last_seen).num_milliseconds().abs() as f64 / 1000.0;
            if gap <= window_secs {
                matches.push(CrossCameraMatch {
                    class_label: a.class_label.clone(),
                    track_a: a.track_id,
                    track_b: b.track_id,
                    a_last_seen: a.last_seen,
                    b_first_seen: b.first_seen,
                    gap_secs: gap,
                });
            }
        }
    }
    matches.sort_by(|x, y| x.gap_secs.total_cmp(&y.gap_secs));
    matches
}
