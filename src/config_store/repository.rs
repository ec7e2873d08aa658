//! Camera configuration sources
//!
//! MySQL-backed repository and a static (JSON file / in-memory) source

use super::types::CameraConfig;
use super::CameraConfigSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::path::Path;

/// MySQL camera repository
#[derive(Clone)]
pub struct CameraRepository {
    pool: MySqlPool,
}

impl CameraRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const CAMERA_COLUMNS: &'static str = r#"
        camera_id, name, ip_address, port, username, password,
        family, rtsp_url, enabled, recording_enabled
    "#;
}

#[async_trait]
impl CameraConfigSource for CameraRepository {
    async fn get_camera(&self, camera_id: &str) -> Result<Option<CameraConfig>> {
        let query = format!(
            "SELECT {} FROM cameras WHERE camera_id = ?",
            Self::CAMERA_COLUMNS
        );
        let camera = sqlx::query_as::<_, CameraConfig>(&query)
            .bind(camera_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(camera)
    }

    async fn list_cameras(&self) -> Result<Vec<CameraConfig>> {
        let query = format!(
            "SELECT {} FROM cameras WHERE enabled = TRUE ORDER BY camera_id",
            Self::CAMERA_COLUMNS
        );
        let cameras = sqlx::query_as::<_, CameraConfig>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(cameras)
    }
}

/// Fixed camera list, loaded once from a JSON file or built in memory
pub struct StaticCameraSource {
    cameras: HashMap<String, CameraConfig>,
}

impl StaticCameraSource {
    /// Build from an explicit list
    pub fn new(cameras: Vec<CameraConfig>) -> Self {
        Self {
            cameras: cameras
                .into_iter()
                .map(|c| (c.camera_id.clone(), c))
                .collect(),
        }
    }

    /// Load from a JSON array file. A missing file yields an empty source.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::warn!(path = %path.display(), "Camera file not found, no cameras configured");
            return Ok(Self::new(Vec::new()));
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let cameras: Vec<CameraConfig> = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid camera file {}: {}", path.display(), e)))?;

        tracing::info!(path = %path.display(), count = cameras.len(), "Loaded camera file");
        Ok(Self::new(cameras))
    }
}

#[async_trait]
impl CameraConfigSource for StaticCameraSource {
    async fn get_camera(&self, camera_id: &str) -> Result<Option<CameraConfig>> {
        Ok(self.cameras.get(camera_id).cloned())
    }

    async fn list_cameras(&self) -> Result<Vec<CameraConfig>> {
        let mut cameras: Vec<_> = self
            .cameras
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        cameras.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        Ok(cameras)
    }
}
