//! Segment writers
//!
//! The ffmpeg writer takes the JPEG frames read from the camera on stdin
//! and encodes them into one H.264 file per segment.

use crate::camera_connection::Frame;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

/// One open segment file
#[async_trait]
pub trait SegmentWriter: Send {
    async fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Close the file; returns its size in bytes
    async fn finish(self: Box<Self>) -> Result<u64>;
}

/// Opens segment writers
#[async_trait]
pub trait SegmentWriterFactory: Send + Sync {
    /// Open a writer for `path`, sized from the first frame
    async fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn SegmentWriter>>;
}

/// ffmpeg encoder fed through stdin
pub struct FfmpegWriterFactory {
    ffmpeg_path: String,
    finish_timeout: Duration,
}

impl FfmpegWriterFactory {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            finish_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl SegmentWriterFactory for FfmpegWriterFactory {
    async fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn SegmentWriter>> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Write(format!("create {}: {}", parent.display(), e)))?;
        }

        let fps = fps.max(1).to_string();
        let size = format!("{}x{}", width, height);
        let mut child = Command::new(&self.ffmpeg_path)
            .args([
                "-y",
                "-loglevel", "error",
                "-f", "mjpeg",
                "-framerate", &fps,
                "-i", "-",
                "-an",
                "-s", &size,
                "-c:v", "libx264",
                "-preset", "veryfast",
                "-pix_fmt", "yuv420p",
                "-movflags", "+faststart",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Write(format!("ffmpeg spawn failed: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Write("ffmpeg stdin unavailable".to_string()))?;

        Ok(Box::new(FfmpegSegmentWriter {
            child,
            stdin: Some(stdin),
            path: path.to_path_buf(),
            finish_timeout: self.finish_timeout,
        }))
    }
}

struct FfmpegSegmentWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    finish_timeout: Duration,
}

#[async_trait]
impl SegmentWriter for FfmpegSegmentWriter {
    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Write("segment already closed".to_string()))?;
        stdin
            .write_all(&frame.data)
            .await
            .map_err(|e| Error::Write(format!("{}: {}", self.path.display(), e)))
    }

    async fn finish(mut self: Box<Self>) -> Result<u64> {
        // EOF on stdin lets ffmpeg write the trailer
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        match tokio::time::timeout(self.finish_timeout, self.child.wait()).await {
            Ok(Ok(status)) if !status.success() => {
                tracing::warn!(path = %self.path.display(), status = %status, "Encoder exited with error");
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Encoder wait failed");
            }
            Err(_) => {
                tracing::warn!(path = %self.path.display(), "Encoder did not finish in time, killing");
                let _ = self.child.kill().await;
            }
            Ok(Ok(_)) => {}
        }

        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| Error::Write(format!("{}: {}", self.path.display(), e)))?;
        Ok(meta.len())
    }
}
