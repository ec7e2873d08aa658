//! ConfigStore - camera configuration lookup
//!
//! ## Responsibilities
//!
//! - Camera inventory (address, credentials, family, recording flag)
//! - RTSP URI derivation
//!
//! The store itself is external; this module only reads it.

mod repository;
mod types;

pub use repository::{CameraRepository, StaticCameraSource};
pub use types::*;

use crate::error::Result;
use async_trait::async_trait;

/// Read access to camera configuration
#[async_trait]
pub trait CameraConfigSource: Send + Sync {
    /// Fetch one camera (including disabled ones)
    async fn get_camera(&self, camera_id: &str) -> Result<Option<CameraConfig>>;

    /// List enabled cameras
    async fn list_cameras(&self) -> Result<Vec<CameraConfig>>;
}
