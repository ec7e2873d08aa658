//! Camera configuration types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Camera record as stored in the external configuration store
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CameraConfig {
    pub camera_id: String,
    pub name: String,
    pub ip_address: String,
    #[serde(default = "default_rtsp_port")]
    pub port: i32,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Stored as VARCHAR, converted to CameraFamily
    #[serde(default = "default_family")]
    pub family: String,
    /// Explicit RTSP URL, overrides the family template
    #[serde(default)]
    pub rtsp_url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub recording_enabled: bool,
}

fn default_rtsp_port() -> i32 {
    554
}

fn default_family() -> String {
    "generic".to_string()
}

fn default_true() -> bool {
    true
}

impl CameraConfig {
    /// Camera family parsed from the stored string
    pub fn family(&self) -> CameraFamily {
        CameraFamily::from(self.family.as_str())
    }

    /// Stream URI: explicit URL if configured, otherwise the family template
    pub fn rtsp_uri(&self) -> String {
        if let Some(url) = self.rtsp_url.as_ref().filter(|u| !u.is_empty()) {
            return url.clone();
        }
        let path = self.family().rtsp_path();
        if self.username.is_empty() {
            format!("rtsp://{}:{}{}", self.ip_address, self.port, path)
        } else {
            format!(
                "rtsp://{}:{}@{}:{}{}",
                self.username, self.password, self.ip_address, self.port, path
            )
        }
    }
}

/// Camera family (brand) used to derive the RTSP path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CameraFamily {
    Hikvision,
    Dahua,
    TpLink,
    Xiaomi,
    #[default]
    Generic,
}

impl CameraFamily {
    /// Main stream path for this family
    pub fn rtsp_path(&self) -> &'static str {
        match self {
            CameraFamily::Hikvision => "/Streaming/Channels/101",
            CameraFamily::Dahua => "/cam/realmonitor?channel=1&subtype=0",
            CameraFamily::TpLink => "/stream1",
            CameraFamily::Xiaomi => "/stream1",
            CameraFamily::Generic => "/stream",
        }
    }
}

impl From<&str> for CameraFamily {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hikvision" => Self::Hikvision,
            "dahua" => Self::Dahua,
            "tp-link" | "tplink" | "tapo" => Self::TpLink,
            "xiaomi" => Self::Xiaomi,
            _ => Self::Generic,
        }
    }
}

impl From<CameraFamily> for String {
    fn from(f: CameraFamily) -> Self {
        match f {
            CameraFamily::Hikvision => "hikvision".to_string(),
            CameraFamily::Dahua => "dahua".to_string(),
            CameraFamily::TpLink => "tp-link".to_string(),
            CameraFamily::Xiaomi => "xiaomi".to_string(),
            CameraFamily::Generic => "generic".to_string(),
        }
    }
}
