//! Archive - on-disk segment layout and time-range lookup
//!
//! ## Layout
//!
//! `<root>/<camera_id>/<YYYY-MM-DD>/<HH-MM-SS>.<ext>`, one file per segment.
//! Extracted clips live in `<root>/clips/`.
//!
//! A segment covers `[start, start + segment_duration]` nominally; the
//! file name is the only source of its start time.

mod catalog;

pub use catalog::{ArchiveCatalog, InMemoryCatalog, MySqlArchiveCatalog};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Default nominal segment length (seconds)
pub const DEFAULT_SEGMENT_DURATION_SECS: u64 = 600;

/// Directory holding extracted clips
pub const CLIPS_DIR: &str = "clips";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H-%M-%S";

/// Path convention for one archive root
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    extension: String,
    segment_duration_secs: u64,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, segment_duration_secs: u64) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            segment_duration_secs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn segment_duration_secs(&self) -> u64 {
        self.segment_duration_secs
    }

    pub fn segment_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.segment_duration_secs as i64)
    }

    pub fn camera_dir(&self, camera_id: &str) -> PathBuf {
        self.root.join(camera_id)
    }

    pub fn day_dir(&self, camera_id: &str, date: NaiveDate) -> PathBuf {
        self.camera_dir(camera_id).join(date.format(DATE_FORMAT).to_string())
    }

    /// File path for a segment starting at `start`
    pub fn segment_path(&self, camera_id: &str, start: NaiveDateTime) -> PathBuf {
        self.day_dir(camera_id, start.date()).join(format!(
            "{}.{}",
            start.format(TIME_FORMAT),
            self.extension
        ))
    }

    /// Start time encoded by a segment file name inside the `date` directory
    pub fn parse_segment_start(&self, date: NaiveDate, file_name: &str) -> Option<NaiveDateTime> {
        let stem = file_name.strip_suffix(&format!(".{}", self.extension))?;
        let time = chrono::NaiveTime::parse_from_str(stem, TIME_FORMAT).ok()?;
        Some(date.and_time(time))
    }

    pub fn clips_dir(&self) -> PathBuf {
        self.root.join(CLIPS_DIR)
    }

    /// Deterministic clip path for a camera and requested start
    pub fn clip_path(&self, camera_id: &str, start: NaiveDateTime) -> PathBuf {
        self.clips_dir().join(format!(
            "clip_{}_{}.{}",
            camera_id,
            start.format("%Y%m%d_%H%M%S"),
            self.extension
        ))
    }
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self::new("/var/lib/camwatch/videos", "mp4", DEFAULT_SEGMENT_DURATION_SECS)
    }
}

/// Camera ids become directory names; reject anything that is not a plain component
pub fn is_safe_camera_id(camera_id: &str) -> bool {
    !camera_id.is_empty()
        && camera_id != CLIPS_DIR
        && camera_id != "."
        && camera_id != ".."
        && !camera_id.contains(['/', '\\', '\0'])
}

/// Parse a day directory name
pub fn parse_day_dir(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, DATE_FORMAT).ok()
}

/// One closed segment
#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    pub camera_id: String,
    pub start: NaiveDateTime,
    pub duration_secs: u64,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Segment file found by a range lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentFile {
    pub path: PathBuf,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Per-camera archive totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    pub total_bytes: u64,
    pub segment_count: u64,
    pub oldest_date: Option<NaiveDate>,
    pub newest_date: Option<NaiveDate>,
}

/// Time-range lookup over the archive layout
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    layout: ArchiveLayout,
}

impl ArchiveIndex {
    pub fn new(layout: ArchiveLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Segments overlapping `[start, end]`, in chronological order.
    ///
    /// Unparseable names are skipped; missing directories yield nothing.
    pub async fn find_segments(
        &self,
        camera_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<SegmentFile> {
        let mut found = Vec::new();
        if !is_safe_camera_id(camera_id) || end < start {
            return found;
        }

        let duration = self.layout.segment_duration();
        // A segment started the previous day may run past midnight into the range
        let first_day = start
            .checked_sub_signed(duration)
            .map(|t| t.date())
            .unwrap_or(NaiveDate::MIN);

        // Only day directories that exist are visited, however wide the range
        let mut days = self.day_dirs(camera_id).await;
        days.retain(|(date, _)| *date >= first_day && *date <= end.date());

        for (day, dir) in days {
            let Ok(mut entries) = fs::read_dir(&dir).await else {
                continue;
            };
            let mut day_segments = Vec::new();

            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                let Some(seg_start) = self.layout.parse_segment_start(day, name) else {
                    continue;
                };
                let Some(seg_end) = seg_start.checked_add_signed(duration) else {
                    continue;
                };
                if seg_start <= end && seg_end >= start {
                    day_segments.push(SegmentFile {
                        path: entry.path(),
                        start: seg_start,
                        end: seg_end,
                    });
                }
            }

            day_segments.sort_by_key(|s| s.start);
            found.extend(day_segments);
        }

        tracing::debug!(
            camera_id = %camera_id,
            start = %start,
            end = %end,
            count = found.len(),
            "Archive lookup"
        );
        found
    }

    /// Dated directories of a camera, oldest first
    async fn day_dirs(&self, camera_id: &str) -> Vec<(NaiveDate, PathBuf)> {
        let mut days = Vec::new();
        if let Ok(mut entries) = fs::read_dir(self.layout.camera_dir(camera_id)).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(date) = entry.file_name().to_str().and_then(parse_day_dir) {
                    days.push((date, entry.path()));
                }
            }
        }
        days.sort_by_key(|(date, _)| *date);
        days
    }

    /// Size, count and date span of a camera's archive
    pub async fn stats(&self, camera_id: &str) -> ArchiveStats {
        let mut stats = ArchiveStats::default();
        if !is_safe_camera_id(camera_id) {
            return stats;
        }

        for (date, path) in self.day_dirs(camera_id).await {
            let Ok(mut entries) = fs::read_dir(&path).await else {
                continue;
            };
            stats.oldest_date.get_or_insert(date);
            stats.newest_date = Some(date);

            while let Ok(Some(entry)) = entries.next_entry().await {
                let is_segment = entry
                    .file_name()
                    .to_str()
                    .and_then(|n| self.layout.parse_segment_start(date, n))
                    .is_some();
                if !is_segment {
                    continue;
                }
                if let Ok(meta) = entry.metadata().await {
                    stats.total_bytes += meta.len();
                    stats.segment_count += 1;
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    async fn touch(layout: &ArchiveLayout, camera_id: &str, start: NaiveDateTime, bytes: usize) -> PathBuf {
        let path = layout.segment_path(camera_id, start);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, vec![0u8; bytes]).await.unwrap();
        path
    }

    fn index(root: &Path) -> ArchiveIndex {
        ArchiveIndex::new(ArchiveLayout::new(root, "mp4", 600))
    }

    #[test]
    fn test_segment_path_and_parse() {
        let layout = ArchiveLayout::new("/archive", "mp4", 600);
        let start = at(5, 14, 30, 7);
        let path = layout.segment_path("cam-1", start);
        assert_eq!(path, PathBuf::from("/archive/cam-1/2024-03-05/14-30-07.mp4"));

        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(layout.parse_segment_start(date, "14-30-07.mp4"), Some(start));
        assert_eq!(layout.parse_segment_start(date, "14-30-07.avi"), None);
        assert_eq!(layout.parse_segment_start(date, "notes.mp4"), None);
    }

    #[test]
    fn test_clip_path_is_deterministic() {
        let layout = ArchiveLayout::new("/archive", "mp4", 600);
        let a = layout.clip_path("cam-1", at(5, 9, 0, 0));
        let b = layout.clip_path("cam-1", at(5, 9, 0, 0));
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/archive/clips/clip_cam-1_20240305_090000.mp4"));
    }

    #[test]
    fn test_safe_camera_id() {
        assert!(is_safe_camera_id("cam-1"));
        assert!(!is_safe_camera_id("../etc"));
        assert!(!is_safe_camera_id("clips"));
        assert!(!is_safe_camera_id(""));
    }

    #[tokio::test]
    async fn test_range_containing_segment_finds_it() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        let t = at(5, 10, 0, 0);
        let path = touch(index.layout(), "cam-1", t, 10).await;

        let found = index
            .find_segments("cam-1", at(5, 9, 55, 0), at(5, 10, 15, 0))
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, path);
        assert_eq!(found[0].start, t);
        assert_eq!(found[0].end, at(5, 10, 10, 0));
    }

    #[tokio::test]
    async fn test_range_before_or_after_excludes_segment() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        touch(index.layout(), "cam-1", at(5, 10, 0, 0), 10).await;

        let before = index
            .find_segments("cam-1", at(5, 9, 0, 0), at(5, 9, 59, 59))
            .await;
        assert!(before.is_empty());

        let after = index
            .find_segments("cam-1", at(5, 10, 10, 1), at(5, 11, 0, 0))
            .await;
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn test_multi_day_range_is_chronological_and_skips_junk() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        let layout = index.layout().clone();
        touch(&layout, "cam-1", at(6, 0, 5, 0), 1).await;
        touch(&layout, "cam-1", at(5, 23, 55, 0), 1).await;
        touch(&layout, "cam-1", at(5, 23, 45, 0), 1).await;
        fs::write(layout.day_dir("cam-1", at(5, 0, 0, 0).date()).join("garbage.mp4"), b"x")
            .await
            .unwrap();

        let found = index
            .find_segments("cam-1", at(5, 23, 50, 0), at(6, 0, 10, 0))
            .await;
        let starts: Vec<_> = found.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(5, 23, 45, 0), at(5, 23, 55, 0), at(6, 0, 5, 0)]);
    }

    #[tokio::test]
    async fn test_segment_from_previous_day_overlapping_midnight() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        touch(index.layout(), "cam-1", at(5, 23, 58, 0), 1).await;

        let found = index
            .find_segments("cam-1", at(6, 0, 2, 0), at(6, 0, 4, 0))
            .await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_no_archive_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        assert!(index
            .find_segments("missing", at(5, 0, 0, 0), at(5, 1, 0, 0))
            .await
            .is_empty());
        assert!(index
            .find_segments("cam-1", at(5, 1, 0, 0), at(5, 0, 0, 0))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_extreme_range_visits_only_existing_days() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        touch(index.layout(), "cam-1", at(4, 10, 0, 0), 1).await;
        touch(index.layout(), "cam-1", at(5, 10, 0, 0), 1).await;

        let found = index
            .find_segments("cam-1", NaiveDateTime::MIN, NaiveDateTime::MAX)
            .await;
        let starts: Vec<_> = found.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(4, 10, 0, 0), at(5, 10, 0, 0)]);

        let near_min = NaiveDateTime::MIN + chrono::Duration::seconds(30);
        assert!(index
            .find_segments("cam-1", near_min, near_min + chrono::Duration::hours(1))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path());
        touch(index.layout(), "cam-1", at(4, 10, 0, 0), 100).await;
        touch(index.layout(), "cam-1", at(5, 10, 0, 0), 50).await;
        touch(index.layout(), "cam-1", at(5, 10, 10, 0), 50).await;

        let stats = index.stats("cam-1").await;
        assert_eq!(stats.segment_count, 3);
        assert_eq!(stats.total_bytes, 200);
        assert_eq!(stats.oldest_date, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(stats.newest_date, NaiveDate::from_ymd_opt(2024, 3, 5));

        assert_eq!(index.stats("other").await, ArchiveStats::default());
    }
}
