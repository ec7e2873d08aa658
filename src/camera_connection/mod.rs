//! CameraConnection - one network video stream
//!
//! ## Responsibilities
//!
//! - Open a stream and verify it by reading one frame within a timeout
//! - Best-effort frame reads bounded by a read timeout
//! - Reconnect with backoff when the stream dies
//!
//! Failures never leave this module as errors: `connect` returns a bool and
//! `read_frame` returns `None`. The last failure reason is kept for
//! diagnostics.
//!
//! A [`ConnectionMonitor`] observes a connection without taking its lock.
//! It carries the latest [`CameraInfo`] and can close the connection, after
//! which it never opens a stream again.

mod backend;
mod types;

pub use backend::{
    classify_failure, FfmpegStreamBackend, FrameReader, MjpegSplitter, OpenedStream,
    StreamBackend,
};
pub use types::*;

use crate::config_store::CameraConfig;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};

/// Lock-free view of a connection
#[derive(Clone)]
pub struct ConnectionMonitor {
    info: watch::Receiver<CameraInfo>,
    closed: Arc<AtomicBool>,
}

impl ConnectionMonitor {
    /// Latest published snapshot
    pub fn info(&self) -> CameraInfo {
        self.info.borrow().clone()
    }

    /// Permanently stop the connection from opening streams.
    /// The owner releases the current stream on its next read.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Handle on one camera stream
pub struct CameraConnection {
    camera: CameraConfig,
    uri: String,
    backend: Arc<dyn StreamBackend>,
    config: ConnectionConfig,
    reader: Option<Box<dyn FrameReader>>,
    state: ConnectionState,
    stream_info: Option<StreamInfo>,
    last_read_at: Option<DateTime<Utc>>,
    last_failure: Option<ConnectFailure>,
    failed_reads: u32,
    last_connect_attempt: Option<Instant>,
    closed: Arc<AtomicBool>,
    published: watch::Sender<CameraInfo>,
}

impl CameraConnection {
    pub fn new(camera: CameraConfig, backend: Arc<dyn StreamBackend>, config: ConnectionConfig) -> Self {
        let uri = camera.rtsp_uri();
        tracing::debug!(
            camera_id = %camera.camera_id,
            uri = %mask_credentials(&uri),
            "Camera connection created"
        );
        let initial = CameraInfo {
            camera_id: camera.camera_id.clone(),
            name: camera.name.clone(),
            uri: mask_credentials(&uri),
            state: ConnectionState::Disconnected,
            last_read_at: None,
            width: None,
            height: None,
            fps: None,
        };
        let (published, _) = watch::channel(initial);
        Self {
            camera,
            uri,
            backend,
            config,
            reader: None,
            state: ConnectionState::Disconnected,
            stream_info: None,
            last_read_at: None,
            last_failure: None,
            failed_reads: 0,
            last_connect_attempt: None,
            closed: Arc::new(AtomicBool::new(false)),
            published,
        }
    }

    /// Observer that stays valid while the connection is locked elsewhere
    pub fn monitor(&self) -> ConnectionMonitor {
        ConnectionMonitor {
            info: self.published.subscribe(),
            closed: self.closed.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish(&self) {
        self.published.send_replace(self.info());
    }

    pub fn camera_id(&self) -> &str {
        &self.camera.camera_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn last_read_at(&self) -> Option<DateTime<Utc>> {
        self.last_read_at
    }

    pub fn last_failure(&self) -> Option<&ConnectFailure> {
        self.last_failure.as_ref()
    }

    /// Open the stream and verify it with one frame
    pub async fn connect(&mut self) -> bool {
        if self.reader.is_some() {
            self.disconnect().await;
        }
        if self.is_closed() {
            tracing::debug!(camera_id = %self.camera.camera_id, "Connection closed, not connecting");
            return false;
        }
        self.last_connect_attempt = Some(Instant::now());

        tracing::info!(camera_id = %self.camera.camera_id, name = %self.camera.name, "Connecting to camera");

        let backend = self.backend.clone();
        let uri = self.uri.clone();
        let attempt = timeout(self.config.connect_timeout, async move {
            let mut opened = backend.open(&uri).await?;
            match opened.reader.read_frame().await {
                Ok(Some(_)) => Ok::<OpenedStream, ConnectFailure>(opened),
                Ok(None) | Err(_) => {
                    opened.reader.close().await;
                    Err(ConnectFailure::NoFrame)
                }
            }
        })
        .await;

        match attempt {
            Ok(Ok(opened)) => {
                self.reader = Some(opened.reader);
                self.stream_info = Some(opened.info);
                self.state = ConnectionState::Connected;
                self.last_read_at = Some(Utc::now());
                self.last_failure = None;
                self.failed_reads = 0;
                tracing::info!(
                    camera_id = %self.camera.camera_id,
                    width = opened.info.width,
                    height = opened.info.height,
                    fps = opened.info.fps,
                    "Camera connected"
                );
                self.publish();
                true
            }
            Ok(Err(failure)) => {
                self.fail_connect(failure);
                false
            }
            Err(_) => {
                self.fail_connect(ConnectFailure::Timeout);
                false
            }
        }
    }

    fn fail_connect(&mut self, failure: ConnectFailure) {
        tracing::warn!(
            camera_id = %self.camera.camera_id,
            reason = %failure,
            "Camera connect failed"
        );
        self.state = ConnectionState::Disconnected;
        self.last_failure = Some(failure);
        self.publish();
    }

    /// Best-effort read. Never blocks longer than the read timeout (plus one
    /// connect timeout when a reconnect is due).
    pub async fn read_frame(&mut self) -> Option<Frame> {
        if self.is_closed() {
            if self.reader.is_some() {
                self.disconnect().await;
            }
            return None;
        }
        if self.reader.is_none() {
            if !self.reconnect_due() {
                return None;
            }
            if !self.reconnect().await {
                return None;
            }
        }

        let reader = self.reader.as_mut()?;
        match timeout(self.config.read_timeout, reader.read_frame()).await {
            Ok(Ok(Some(frame))) => {
                self.failed_reads = 0;
                self.last_read_at = Some(frame.captured_at);
                self.publish();
                Some(frame)
            }
            Ok(Ok(None)) => {
                tracing::warn!(camera_id = %self.camera.camera_id, "Camera stream ended");
                self.mark_lost().await;
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(camera_id = %self.camera.camera_id, error = %e, "Frame read failed");
                self.count_failed_read().await;
                None
            }
            Err(_) => {
                tracing::debug!(
                    camera_id = %self.camera.camera_id,
                    timeout_ms = self.config.read_timeout.as_millis() as u64,
                    "Frame read timed out"
                );
                self.count_failed_read().await;
                None
            }
        }
    }

    async fn count_failed_read(&mut self) {
        self.failed_reads += 1;
        if self.failed_reads >= self.config.max_failed_reads {
            tracing::warn!(
                camera_id = %self.camera.camera_id,
                failed_reads = self.failed_reads,
                "Camera stream considered lost"
            );
            self.mark_lost().await;
        }
    }

    async fn mark_lost(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close().await;
        }
        self.state = ConnectionState::Disconnected;
        self.failed_reads = 0;
        self.publish();
    }

    fn reconnect_due(&self) -> bool {
        match self.last_connect_attempt {
            Some(at) => at.elapsed() >= self.config.reconnect_backoff,
            None => true,
        }
    }

    /// Disconnect, wait the backoff, connect again
    pub async fn reconnect(&mut self) -> bool {
        tracing::info!(camera_id = %self.camera.camera_id, "Reconnecting camera");
        self.disconnect().await;
        tokio::time::sleep(self.config.reconnect_backoff).await;
        self.connect().await
    }

    /// Release the stream. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close().await;
            tracing::info!(camera_id = %self.camera.camera_id, "Camera disconnected");
        }
        self.state = ConnectionState::Disconnected;
        self.failed_reads = 0;
        self.publish();
    }

    /// Connect and report resolution/frame rate, or why it failed
    pub async fn test_connection(&mut self) -> ConnectionTest {
        if self.connect().await {
            if self.read_frame().await.is_some() {
                let info = self.info();
                return ConnectionTest {
                    success: true,
                    message: format!(
                        "Camera '{}' connected. Resolution: {}x{}, FPS: {}",
                        self.camera.name,
                        info.width.map(|w| w.to_string()).unwrap_or_else(|| "N/A".into()),
                        info.height.map(|h| h.to_string()).unwrap_or_else(|| "N/A".into()),
                        info.fps.map(|f| format!("{:.1}", f)).unwrap_or_else(|| "N/A".into()),
                    ),
                };
            }
            return ConnectionTest {
                success: false,
                message: format!("Camera '{}' connected but no video could be read", self.camera.name),
            };
        }

        let reason = self
            .last_failure
            .clone()
            .unwrap_or(ConnectFailure::Other("unknown error".to_string()));
        ConnectionTest {
            success: false,
            message: format!(
                "Could not connect to camera '{}' ({}:{}): {}. Please {}.",
                self.camera.name,
                self.camera.ip_address,
                self.camera.port,
                reason,
                reason.hint()
            ),
        }
    }

    /// Listing snapshot
    pub fn info(&self) -> CameraInfo {
        let connected = self.is_connected();
        let stream = self.stream_info.filter(|_| connected);
        CameraInfo {
            camera_id: self.camera.camera_id.clone(),
            name: self.camera.name.clone(),
            uri: mask_credentials(&self.uri),
            state: self.state,
            last_read_at: self.last_read_at,
            width: stream.map(|s| s.width),
            height: stream.map(|s| s.height),
            fps: stream.map(|s| s.fps),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend shared by connection, registry and recorder tests

    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// How the scripted stream behaves
    #[derive(Clone)]
    pub enum Script {
        /// `open` fails with this reason
        Refuse(ConnectFailure),
        /// Frames arrive every `interval`
        Steady { interval: Duration },
        /// `first_ok` frames arrive, then every read fails
        DiesAfter { interval: Duration, first_ok: usize },
        /// `open` succeeds, reads never complete
        Hang,
        /// `first_ok` frames arrive, then reads never complete
        StallsAfter { interval: Duration, first_ok: usize },
    }

    pub struct ScriptedBackend {
        scripts: Mutex<Vec<Script>>,
        pub opens: AtomicUsize,
    }

    impl ScriptedBackend {
        /// Each `open` pops the next script; the last one repeats
        pub fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts),
                opens: AtomicUsize::new(0),
            })
        }

        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StreamBackend for ScriptedBackend {
        async fn open(&self, _uri: &str) -> std::result::Result<OpenedStream, ConnectFailure> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.len() > 1 {
                    scripts.remove(0)
                } else {
                    scripts[0].clone()
                }
            };
            if let Script::Refuse(reason) = script {
                return Err(reason);
            }
            Ok(OpenedStream {
                reader: Box::new(ScriptedReader { script, served: 0 }),
                info: StreamInfo { width: 640, height: 480, fps: 15.0 },
            })
        }
    }

    struct ScriptedReader {
        script: Script,
        served: usize,
    }

    #[async_trait]
    impl FrameReader for ScriptedReader {
        async fn read_frame(&mut self) -> Result<Option<Frame>> {
            match self.script {
                Script::Steady { interval } => tokio::time::sleep(interval).await,
                Script::DiesAfter { interval, first_ok } => {
                    if self.served >= first_ok {
                        return Err(Error::Connection("socket reset".to_string()));
                    }
                    tokio::time::sleep(interval).await;
                }
                Script::Hang => std::future::pending::<()>().await,
                Script::StallsAfter { interval, first_ok } => {
                    if self.served >= first_ok {
                        std::future::pending::<()>().await;
                    }
                    tokio::time::sleep(interval).await;
                }
                Script::Refuse(_) => unreachable!(),
            }
            self.served += 1;
            Ok(Some(Frame {
                width: 640,
                height: 480,
                data: vec![0xFF, 0xD8, self.served as u8, 0xFF, 0xD9],
                captured_at: Utc::now(),
            }))
        }

        async fn close(&mut self) {}
    }

    pub fn camera(camera_id: &str) -> CameraConfig {
        CameraConfig {
            camera_id: camera_id.to_string(),
            name: camera_id.to_string(),
            ip_address: "10.0.0.10".to_string(),
            port: 554,
            username: "admin".to_string(),
            password: "pw".to_string(),
            family: "generic".to_string(),
            rtsp_url: None,
            enabled: true,
            recording_enabled: true,
        }
    }
}
