//! CameraConnection types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One decoded-and-reencoded frame pulled from a stream (JPEG bytes)
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Stream properties reported at open time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Connection state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Why a connect attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectFailure {
    #[error("authentication rejected")]
    Auth,
    #[error("connection refused")]
    Refused,
    #[error("host unreachable")]
    Unreachable,
    #[error("timed out")]
    Timeout,
    #[error("stream path not found")]
    StreamNotFound,
    #[error("no frame received")]
    NoFrame,
    #[error("{0}")]
    Other(String),
}

impl ConnectFailure {
    /// Operator-facing hint for this failure
    pub fn hint(&self) -> &'static str {
        match self {
            ConnectFailure::Auth => "check the username and password",
            ConnectFailure::Refused => "check the RTSP port (usually 554)",
            ConnectFailure::Unreachable => "check the IP address and that the camera is on the network",
            ConnectFailure::Timeout => "the camera did not answer in time; check the network",
            ConnectFailure::StreamNotFound => "check the camera family or the explicit RTSP URL",
            ConnectFailure::NoFrame => "the stream opened but produced no video",
            ConnectFailure::Other(_) => "check the camera settings",
        }
    }
}

/// Result of `test_connection`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

/// Snapshot of a handle for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub camera_id: String,
    pub name: String,
    /// URI with credentials masked
    pub uri: String,
    pub state: ConnectionState,
    pub last_read_at: Option<DateTime<Utc>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

/// Timeouts and reconnect policy
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on open + first frame
    pub connect_timeout: Duration,
    /// Bound on a single frame read
    pub read_timeout: Duration,
    /// Pause between disconnect and connect in `reconnect`
    pub reconnect_backoff: Duration,
    /// Consecutive failed reads before the stream is considered dead
    pub max_failed_reads: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            reconnect_backoff: Duration::from_secs(1),
            max_failed_reads: 3,
        }
    }
}

/// Replace the userinfo part of an RTSP URI with `***`
pub fn mask_credentials(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &uri[..scheme_end + 3], &uri[at..])
        }
        _ => uri.to_string(),
    }
}
