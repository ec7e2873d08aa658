//! Recorder - continuous per-camera segment recording
//!
//! ## Responsibilities
//!
//! - One tokio task per recording camera, started and stopped explicitly
//! - Lazily open a segment from the first frame's resolution
//! - Rotate segments at the nominal duration and catalog each closed one
//! - Flush the open segment on stop
//!
//! ## Failure handling
//!
//! - Camera disabled: `Error::Validation`, nothing connected
//! - Camera unavailable at start: `Failed` status, no task spawned
//! - Frame read returns nothing: short sleep, retry (reconnect is the
//!   connection's job)
//! - Write error: logged, frame dropped, loop continues
//! - Camera removed from the registry: the loop flushes and ends
//!
//! ## Stopping
//!
//! A stop signal cancels an in-flight read, including a reconnect. `stop`
//! waits up to `join_timeout` for the flush. A loop still flushing after that
//! stays registered as `Stopping` and the camera cannot be started again
//! until it has finished.

mod retention;
mod writer;

pub use retention::cleanup_old_archives;
pub use writer::{FfmpegWriterFactory, SegmentWriter, SegmentWriterFactory};

use crate::archive::{ArchiveCatalog, ArchiveLayout, Segment};
use crate::camera_connection::{ConnectionMonitor, Frame};
use crate::camera_registry::{CameraRegistry, SharedConnection};
use crate::clock::Clock;
use crate::error::{Error, Result};
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Recorder settings
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Encoder frame rate
    pub fps: u32,
    /// Sleep after an empty read
    pub idle_sleep: Duration,
    /// How long `stop` waits for the loop to flush
    pub join_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            fps: 15,
            idle_sleep: Duration::from_millis(100),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Recording state of one camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecorderStatus {
    Recording { since: NaiveDateTime },
    /// Stop requested, the loop is still flushing
    Stopping,
    Stopped,
    Failed { reason: String },
}

struct RecordingTask {
    id: u64,
    stop: watch::Sender<bool>,
    /// Closed when the loop has exited
    done: watch::Receiver<()>,
    handle: JoinHandle<()>,
}

impl RecordingTask {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Recorder instance
pub struct Recorder {
    registry: Arc<CameraRegistry>,
    layout: ArchiveLayout,
    catalog: Arc<dyn ArchiveCatalog>,
    writers: Arc<dyn SegmentWriterFactory>,
    clock: Arc<dyn Clock>,
    config: RecorderConfig,
    tasks: Mutex<HashMap<String, RecordingTask>>,
    statuses: Arc<RwLock<HashMap<String, RecorderStatus>>>,
    next_task_id: AtomicU64,
}

impl Recorder {
    pub fn new(
        registry: Arc<CameraRegistry>,
        layout: ArchiveLayout,
        catalog: Arc<dyn ArchiveCatalog>,
        writers: Arc<dyn SegmentWriterFactory>,
        clock: Arc<dyn Clock>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            registry,
            layout,
            catalog,
            writers,
            clock,
            config,
            tasks: Mutex::new(HashMap::new()),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Start recording. Starting a camera that is already recording is a no-op;
    /// starting one whose previous loop is still flushing is a conflict.
    pub async fn start(&self, camera_id: &str) -> Result<()> {
        if self.check_running(camera_id).await? {
            tracing::debug!(camera_id = %camera_id, "Recording already running");
            return Ok(());
        }

        if let Ok(Some(camera)) = self.registry.source().get_camera(camera_id).await {
            if !camera.enabled {
                tracing::warn!(camera_id = %camera_id, "Cannot record a disabled camera");
                return Err(Error::Validation(format!("camera {} is disabled", camera_id)));
            }
        }

        let Some(conn) = self.registry.get_or_connect(camera_id).await else {
            let reason = format!("camera {} unavailable", camera_id);
            self.set_status(camera_id, RecorderStatus::Failed { reason: reason.clone() })
                .await;
            tracing::error!(camera_id = %camera_id, "Cannot start recording, camera unavailable");
            return Err(Error::Connection(reason));
        };
        let Some(monitor) = self.registry.monitor(camera_id).await else {
            return Err(Error::Connection(format!("camera {} was removed", camera_id)));
        };

        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.get(camera_id) {
            if task.is_running() {
                if task.stop_requested() {
                    return Err(still_stopping(camera_id));
                }
                return Ok(());
            }
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(());
        let ctx = LoopContext {
            camera_id: camera_id.to_string(),
            layout: self.layout.clone(),
            catalog: self.catalog.clone(),
            writers: self.writers.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            statuses: self.statuses.clone(),
        };

        self.set_status(camera_id, RecorderStatus::Recording { since: self.clock.now() })
            .await;
        let handle = tokio::spawn(async move {
            record_loop(ctx, conn, monitor, stop_rx).await;
            drop(done_tx);
        });
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        tasks.insert(
            camera_id.to_string(),
            RecordingTask {
                id,
                stop: stop_tx,
                done: done_rx,
                handle,
            },
        );

        tracing::info!(camera_id = %camera_id, "Recording started");
        Ok(())
    }

    /// True when a loop is running and was not asked to stop
    async fn check_running(&self, camera_id: &str) -> Result<bool> {
        match self.tasks.lock().await.get(camera_id) {
            Some(task) if task.is_running() && task.stop_requested() => {
                Err(still_stopping(camera_id))
            }
            Some(task) => Ok(task.is_running()),
            None => Ok(false),
        }
    }

    /// Signal the loop to stop and wait (bounded) for it to flush.
    /// Returns false when the camera was not recording.
    pub async fn stop(&self, camera_id: &str) -> bool {
        let Some((id, done)) = self.request_stop(camera_id).await else {
            return false;
        };
        self.await_stop(camera_id, id, done).await;
        true
    }

    /// Stop every recording concurrently
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.tasks.lock().await.keys().cloned().collect();
        let mut pending = Vec::new();
        for camera_id in ids {
            if let Some((id, done)) = self.request_stop(&camera_id).await {
                pending.push((camera_id, id, done));
            }
        }

        futures::future::join_all(
            pending
                .into_iter()
                .map(|(camera_id, id, done)| async move {
                    self.await_stop(&camera_id, id, done).await
                }),
        )
        .await;
        tracing::info!("All recordings stopped");
    }

    /// Mark `Stopping` and signal the loop. None when nothing is running.
    async fn request_stop(&self, camera_id: &str) -> Option<(u64, watch::Receiver<()>)> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get(camera_id)?;
        if !task.is_running() {
            tasks.remove(camera_id);
            return None;
        }

        // Status first: the loop writes Stopped when it exits
        self.set_status(camera_id, RecorderStatus::Stopping).await;
        task.stop.send_replace(true);
        Some((task.id, task.done.clone()))
    }

    async fn await_stop(&self, camera_id: &str, id: u64, done: watch::Receiver<()>) {
        if wait_for_exit(done, self.config.join_timeout).await {
            let mut tasks = self.tasks.lock().await;
            if tasks.get(camera_id).is_some_and(|t| t.id == id) {
                tasks.remove(camera_id);
            }
            tracing::info!(camera_id = %camera_id, "Recording stopped");
        } else {
            tracing::warn!(
                camera_id = %camera_id,
                timeout_ms = self.config.join_timeout.as_millis() as u64,
                "Recording loop still flushing, left stopping"
            );
        }
    }

    pub async fn is_recording(&self, camera_id: &str) -> bool {
        self.tasks
            .lock()
            .await
            .get(camera_id)
            .map(|t| t.is_running() && !t.stop_requested())
            .unwrap_or(false)
    }

    pub async fn status(&self, camera_id: &str) -> RecorderStatus {
        self.statuses
            .read()
            .await
            .get(camera_id)
            .cloned()
            .unwrap_or(RecorderStatus::Stopped)
    }

    /// Status of every camera the recorder has seen
    pub async fn statuses(&self) -> BTreeMap<String, RecorderStatus> {
        self.statuses
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn set_status(&self, camera_id: &str, status: RecorderStatus) {
        self.statuses
            .write()
            .await
            .insert(camera_id.to_string(), status);
    }
}

fn still_stopping(camera_id: &str) -> Error {
    Error::Conflict(format!("camera {} is still stopping", camera_id))
}

/// Wait until the loop drops its `done` sender; false on timeout
async fn wait_for_exit(mut done: watch::Receiver<()>, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async move {
        while done.changed().await.is_ok() {}
    })
    .await
    .is_ok()
}

/// Everything a recording loop owns
struct LoopContext {
    camera_id: String,
    layout: ArchiveLayout,
    catalog: Arc<dyn ArchiveCatalog>,
    writers: Arc<dyn SegmentWriterFactory>,
    clock: Arc<dyn Clock>,
    config: RecorderConfig,
    statuses: Arc<RwLock<HashMap<String, RecorderStatus>>>,
}

struct OpenSegment {
    writer: Box<dyn SegmentWriter>,
    start: NaiveDateTime,
    opened: Instant,
    path: PathBuf,
    frames: u64,
    dropped: u64,
}

async fn record_loop(
    ctx: LoopContext,
    conn: SharedConnection,
    monitor: ConnectionMonitor,
    mut stop: watch::Receiver<bool>,
) {
    let rotate_after = Duration::from_secs(ctx.layout.segment_duration_secs());
    let mut current: Option<OpenSegment> = None;
    let mut last_start: Option<NaiveDateTime> = None;

    loop {
        // Dropping the read releases the connection lock
        let frame = tokio::select! {
            biased;
            _ = stop.changed() => break,
            frame = async { conn.lock().await.read_frame().await } => frame,
        };
        let frame = match frame {
            Some(frame) => frame,
            None => {
                if monitor.is_closed() {
                    tracing::info!(camera_id = %ctx.camera_id, "Camera removed, recording ends");
                    break;
                }
                let stopped = tokio::select! {
                    biased;
                    _ = stop.changed() => true,
                    _ = tokio::time::sleep(ctx.config.idle_sleep) => false,
                };
                if stopped {
                    break;
                }
                continue;
            }
        };

        if current
            .as_ref()
            .is_some_and(|seg| seg.opened.elapsed() >= rotate_after)
        {
            if let Some(seg) = current.take() {
                close_segment(&ctx, seg).await;
            }
        }

        if current.is_none() {
            current = open_segment(&ctx, &frame, &mut last_start).await;
        }

        if let Some(seg) = current.as_mut() {
            match seg.writer.write_frame(&frame).await {
                Ok(()) => seg.frames += 1,
                Err(e) => {
                    seg.dropped += 1;
                    tracing::warn!(camera_id = %ctx.camera_id, error = %e, "Frame dropped");
                }
            }
        }
    }

    if let Some(seg) = current.take() {
        close_segment(&ctx, seg).await;
    }
    ctx.statuses
        .write()
        .await
        .insert(ctx.camera_id.clone(), RecorderStatus::Stopped);
}

async fn open_segment(
    ctx: &LoopContext,
    frame: &Frame,
    last_start: &mut Option<NaiveDateTime>,
) -> Option<OpenSegment> {
    let now = ctx.clock.now();
    let mut start = now.with_nanosecond(0).unwrap_or(now);
    // File names have second resolution; keep starts strictly increasing
    if let Some(prev) = *last_start {
        if start <= prev {
            start = prev + chrono::Duration::seconds(1);
        }
    }

    let path = ctx.layout.segment_path(&ctx.camera_id, start);
    match ctx
        .writers
        .open(&path, frame.width, frame.height, ctx.config.fps)
        .await
    {
        Ok(writer) => {
            *last_start = Some(start);
            tracing::info!(
                camera_id = %ctx.camera_id,
                path = %path.display(),
                width = frame.width,
                height = frame.height,
                "Segment opened"
            );
            Some(OpenSegment {
                writer,
                start,
                opened: Instant::now(),
                path,
                frames: 0,
                dropped: 0,
            })
        }
        Err(e) => {
            tracing::error!(camera_id = %ctx.camera_id, path = %path.display(), error = %e, "Failed to open segment, frame dropped");
            None
        }
    }
}

async fn close_segment(ctx: &LoopContext, seg: OpenSegment) {
    let duration_secs = seg.opened.elapsed().as_secs();
    let size_bytes = match seg.writer.finish().await {
        Ok(size) => size,
        Err(e) => {
            tracing::error!(camera_id = %ctx.camera_id, path = %seg.path.display(), error = %e, "Failed to finalize segment");
            0
        }
    };

    let segment = Segment {
        camera_id: ctx.camera_id.clone(),
        start: seg.start,
        duration_secs,
        path: seg.path,
        size_bytes,
    };

    tracing::info!(
        camera_id = %ctx.camera_id,
        path = %segment.path.display(),
        frames = seg.frames,
        dropped = seg.dropped,
        size_bytes,
        "Segment closed"
    );

    if let Err(e) = ctx.catalog.record_segment(&segment).await {
        tracing::error!(camera_id = %ctx.camera_id, error = %e, "Failed to catalog segment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::InMemoryCatalog;
    use crate::camera_connection::testing::{camera, Script, ScriptedBackend};
    use crate::camera_connection::{ConnectFailure, ConnectionConfig};
    use crate::config_store::{CameraConfig, StaticCameraSource};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::io::Write;
    use std::path::Path;

    /// Wall clock driven by tokio's (pausable) clock
    struct TokioClock {
        origin: Instant,
        base: NaiveDateTime,
    }

    impl Clock for TokioClock {
        fn now(&self) -> NaiveDateTime {
            let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap();
            self.base + elapsed
        }
    }

    /// Writes raw frame bytes with std::fs so paused time is not disturbed
    #[derive(Default)]
    struct FileWriterFactory {
        fail_writes: bool,
        finish_delay: Duration,
    }

    struct FileWriter {
        file: std::fs::File,
        path: std::path::PathBuf,
        fail_writes: bool,
        finish_delay: Duration,
    }

    #[async_trait]
    impl SegmentWriterFactory for FileWriterFactory {
        async fn open(
            &self,
            path: &Path,
            _width: u32,
            _height: u32,
            _fps: u32,
        ) -> Result<Box<dyn SegmentWriter>> {
            std::fs::create_dir_all(path.parent().unwrap())?;
            let file = std::fs::File::create(path)?;
            Ok(Box::new(FileWriter {
                file,
                path: path.to_path_buf(),
                fail_writes: self.fail_writes,
                finish_delay: self.finish_delay,
            }))
        }
    }

    #[async_trait]
    impl SegmentWriter for FileWriter {
        async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            if self.fail_writes {
                return Err(Error::Write("disk full".to_string()));
            }
            self.file.write_all(&frame.data)?;
            Ok(())
        }

        async fn finish(self: Box<Self>) -> Result<u64> {
            tokio::time::sleep(self.finish_delay).await;
            Ok(std::fs::metadata(&self.path)?.len())
        }
    }

    struct Fixture {
        recorder: Recorder,
        registry: Arc<CameraRegistry>,
        catalog: Arc<InMemoryCatalog>,
        backend: Arc<ScriptedBackend>,
        root: tempfile::TempDir,
    }

    fn fixture(script: Script, fail_writes: bool) -> Fixture {
        fixture_with(
            vec![script],
            FileWriterFactory { fail_writes, ..Default::default() },
            vec![camera("entrance")],
        )
    }

    fn fixture_with(
        scripts: Vec<Script>,
        writers: FileWriterFactory,
        cameras: Vec<CameraConfig>,
    ) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(scripts);
        let source = Arc::new(StaticCameraSource::new(cameras));
        let registry = Arc::new(CameraRegistry::new(
            source,
            backend.clone(),
            ConnectionConfig::default(),
        ));
        let catalog = Arc::new(InMemoryCatalog::new());
        let clock = Arc::new(TokioClock {
            origin: Instant::now(),
            base: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
        });
        let recorder = Recorder::new(
            registry.clone(),
            ArchiveLayout::new(root.path(), "mp4", 600),
            catalog.clone(),
            Arc::new(writers),
            clock,
            RecorderConfig::default(),
        );
        Fixture { recorder, registry, catalog, backend, root }
    }

    fn steady() -> Script {
        Script::Steady { interval: Duration::from_millis(66) }
    }

    fn segment_files(root: &Path, camera_id: &str) -> Vec<String> {
        let day = root.join(camera_id).join("2024-03-05");
        let mut names: Vec<String> = std::fs::read_dir(day)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_after_610_seconds() {
        let f = fixture(steady(), false);
        f.recorder.start("entrance").await.unwrap();

        tokio::time::sleep(Duration::from_secs(610)).await;
        assert!(f.recorder.stop("entrance").await);

        let files = segment_files(f.root.path(), "entrance");
        assert_eq!(files, vec!["08-00-00.mp4", "08-10-00.mp4"]);

        let recorded = f.catalog.recent_segments("entrance", 10).await.unwrap();
        assert_eq!(recorded.len(), 2);
        let gap = recorded[0].start - recorded[1].start;
        assert_eq!(gap.num_seconds(), 600);
        assert!(recorded.iter().all(|s| s.size_bytes > 0));
        assert_eq!(f.recorder.status("entrance").await, RecorderStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let f = fixture(steady(), false);
        f.recorder.start("entrance").await.unwrap();
        f.recorder.start("entrance").await.unwrap();

        assert!(f.recorder.is_recording("entrance").await);
        assert_eq!(f.backend.open_count(), 1);
        assert!(matches!(
            f.recorder.status("entrance").await,
            RecorderStatus::Recording { .. }
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        f.recorder.stop_all().await;
        assert!(!f.recorder.is_recording("entrance").await);
        assert_eq!(segment_files(f.root.path(), "entrance").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_camera_fails_without_task() {
        let f = fixture(Script::Refuse(ConnectFailure::Refused), false);

        assert!(f.recorder.start("entrance").await.is_err());
        assert!(!f.recorder.is_recording("entrance").await);
        assert!(matches!(
            f.recorder.status("entrance").await,
            RecorderStatus::Failed { .. }
        ));

        assert!(f.recorder.start("unknown").await.is_err());
        assert_eq!(f.recorder.statuses().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_errors_do_not_stop_loop() {
        let f = fixture(steady(), true);
        f.recorder.start("entrance").await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(f.recorder.is_recording("entrance").await);

        assert!(f.recorder.stop("entrance").await);
        let recorded = f.catalog.recent_segments("entrance", 10).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].size_bytes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_camera() {
        let f = fixture(steady(), false);
        assert!(!f.recorder.stop("entrance").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_reconnect_and_flushes() {
        // Ten frames, then the stream stalls and every reconnect hangs
        let f = fixture_with(
            vec![
                Script::StallsAfter { interval: Duration::from_millis(66), first_ok: 10 },
                Script::Hang,
            ],
            FileWriterFactory::default(),
            vec![camera("entrance")],
        );
        f.recorder.start("entrance").await.unwrap();
        tokio::time::sleep(Duration::from_secs(17)).await;

        let asked = Instant::now();
        assert!(f.recorder.stop("entrance").await);
        assert!(asked.elapsed() < Duration::from_secs(1));
        assert_eq!(f.recorder.status("entrance").await, RecorderStatus::Stopped);
        assert!(!f.recorder.is_recording("entrance").await);

        // Flushed before stop returned, nothing arrives later
        assert_eq!(f.catalog.recent_segments("entrance", 10).await.unwrap().len(), 1);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.catalog.recent_segments("entrance", 10).await.unwrap().len(), 1);
        assert_eq!(f.recorder.status("entrance").await, RecorderStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_flush_stays_stopping_and_blocks_restart() {
        let f = fixture_with(
            vec![steady()],
            FileWriterFactory { finish_delay: Duration::from_secs(8), ..Default::default() },
            vec![camera("entrance")],
        );
        f.recorder.start("entrance").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(f.recorder.stop("entrance").await);
        assert_eq!(f.recorder.status("entrance").await, RecorderStatus::Stopping);
        assert!(!f.recorder.is_recording("entrance").await);
        assert!(matches!(
            f.recorder.start("entrance").await,
            Err(Error::Conflict(_))
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.recorder.status("entrance").await, RecorderStatus::Stopped);
        assert_eq!(f.catalog.recent_segments("entrance", 10).await.unwrap().len(), 1);

        f.recorder.start("entrance").await.unwrap();
        assert!(f.recorder.is_recording("entrance").await);
        assert_eq!(f.backend.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_camera_ends_recording() {
        let f = fixture(steady(), false);
        f.recorder.start("entrance").await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(f.registry.remove("entrance").await);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!f.recorder.is_recording("entrance").await);
        assert_eq!(f.recorder.status("entrance").await, RecorderStatus::Stopped);
        assert_eq!(f.catalog.recent_segments("entrance", 10).await.unwrap().len(), 1);
        assert_eq!(f.backend.open_count(), 1);

        // Recording again builds one fresh connection
        f.recorder.start("entrance").await.unwrap();
        assert_eq!(f.backend.open_count(), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(f.recorder.stop("entrance").await);
        assert_eq!(f.catalog.recent_segments("entrance", 10).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_camera_is_rejected() {
        let mut lobby = camera("lobby");
        lobby.enabled = false;
        let f = fixture_with(
            vec![steady()],
            FileWriterFactory::default(),
            vec![camera("entrance"), lobby],
        );

        assert!(matches!(
            f.recorder.start("lobby").await,
            Err(Error::Validation(_))
        ));
        assert!(!f.recorder.is_recording("lobby").await);
        assert_eq!(f.backend.open_count(), 0);
    }
}
