//! Segment catalog
//!
//! Closed segments are recorded here in addition to the file layout.
//! Lookups never depend on the catalog; it feeds listings and reporting.

use super::Segment;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;
use tokio::sync::RwLock;

#[async_trait]
pub trait ArchiveCatalog: Send + Sync {
    /// Record a closed segment
    async fn record_segment(&self, segment: &Segment) -> Result<()>;

    /// Most recent segments for a camera, newest first
    async fn recent_segments(&self, camera_id: &str, limit: usize) -> Result<Vec<Segment>>;
}

/// MySQL `video_archive` table
#[derive(Clone)]
pub struct MySqlArchiveCatalog {
    pool: MySqlPool,
}

impl MySqlArchiveCatalog {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SegmentRow {
    camera_id: String,
    start_time: chrono::NaiveDateTime,
    duration_sec: i64,
    file_path: String,
    size_bytes: i64,
}

impl From<SegmentRow> for Segment {
    fn from(row: SegmentRow) -> Self {
        Self {
            camera_id: row.camera_id,
            start: row.start_time,
            duration_secs: row.duration_sec.max(0) as u64,
            path: row.file_path.into(),
            size_bytes: row.size_bytes.max(0) as u64,
        }
    }
}

#[async_trait]
impl ArchiveCatalog for MySqlArchiveCatalog {
    async fn record_segment(&self, segment: &Segment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO video_archive (camera_id, start_time, duration_sec, file_path, size_bytes)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&segment.camera_id)
        .bind(segment.start)
        .bind(segment.duration_secs as i64)
        .bind(segment.path.to_string_lossy().to_string())
        .bind(segment.size_bytes as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_segments(&self, camera_id: &str, limit: usize) -> Result<Vec<Segment>> {
        let rows = sqlx::query_as::<_, SegmentRow>(
            r#"
            SELECT camera_id, start_time, duration_sec, file_path, size_bytes
            FROM video_archive
            WHERE camera_id = ?
            ORDER BY start_time DESC
            LIMIT ?
            "#,
        )
        .bind(camera_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Segment::from).collect())
    }
}

/// Process-local catalog, used when no database is configured
#[derive(Default)]
pub struct InMemoryCatalog {
    segments: RwLock<Vec<Segment>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.segments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ArchiveCatalog for InMemoryCatalog {
    async fn record_segment(&self, segment: &Segment) -> Result<()> {
        self.segments.write().await.push(segment.clone());
        Ok(())
    }

    async fn recent_segments(&self, camera_id: &str, limit: usize) -> Result<Vec<Segment>> {
        let segments = self.segments.read().await;
        let mut matching: Vec<Segment> = segments
            .iter()
            .filter(|s| s.camera_id == camera_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.start.cmp(&a.start));
        matching.truncate(limit);
        Ok(matching)
    }
}
