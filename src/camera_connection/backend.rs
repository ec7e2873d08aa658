//! Stream backends
//!
//! The ffmpeg backend pulls an RTSP stream and re-encodes it to MJPEG on
//! stdout; frames are cut out of the byte stream at JPEG SOI/EOI markers.
//! Resolution and frame rate come from ffprobe.

use super::types::{ConnectFailure, Frame, StreamInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// Opens video streams
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Open a stream; the reader is positioned before the first frame
    async fn open(&self, uri: &str) -> std::result::Result<OpenedStream, ConnectFailure>;
}

/// A live stream
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame. `Ok(None)` means the stream ended.
    async fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying resources
    async fn close(&mut self);
}

/// Reader plus the properties discovered while opening it
pub struct OpenedStream {
    pub reader: Box<dyn FrameReader>,
    pub info: StreamInfo,
}

/// ffmpeg/ffprobe based backend
pub struct FfmpegStreamBackend {
    ffmpeg_path: String,
    ffprobe_path: String,
    info_timeout: Duration,
}

impl FfmpegStreamBackend {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            info_timeout: Duration::from_secs(10),
        }
    }

    /// Query resolution and frame rate of the first video stream
    async fn stream_info(&self, uri: &str) -> std::result::Result<StreamInfo, ConnectFailure> {
        let child = Command::new(&self.ffprobe_path)
            .args([
                "-v", "error",
                "-rtsp_transport", "tcp",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height,r_frame_rate",
                "-of", "json",
                uri,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConnectFailure::Other(format!("ffprobe spawn failed: {}", e)))?;

        let output = match tokio::time::timeout(self.info_timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ConnectFailure::Other(format!("ffprobe failed: {}", e))),
            Err(_) => return Err(ConnectFailure::Timeout),
        };

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        parse_stream_info(&output.stdout).ok_or(ConnectFailure::NoFrame)
    }
}

#[async_trait]
impl StreamBackend for FfmpegStreamBackend {
    async fn open(&self, uri: &str) -> std::result::Result<OpenedStream, ConnectFailure> {
        let info = self.stream_info(uri).await?;

        // -an: video only; -q:v 5: mid quality MJPEG, segments are re-encoded anyway
        let mut child = Command::new(&self.ffmpeg_path)
            .args([
                "-rtsp_transport", "tcp",
                "-i", uri,
                "-an",
                "-f", "image2pipe",
                "-vcodec", "mjpeg",
                "-q:v", "5",
                "-loglevel", "error",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConnectFailure::Other(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConnectFailure::Other("ffmpeg stdout unavailable".to_string()))?;

        Ok(OpenedStream {
            reader: Box::new(FfmpegFrameReader {
                child,
                stdout,
                splitter: MjpegSplitter::default(),
                info,
                buf: vec![0u8; 64 * 1024],
            }),
            info,
        })
    }
}

/// MJPEG pipe reader
struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    splitter: MjpegSplitter,
    info: StreamInfo,
    buf: Vec<u8>,
}

#[async_trait]
impl FrameReader for FfmpegFrameReader {
    async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(jpeg) = self.splitter.next_frame() {
                return Ok(Some(Frame {
                    width: self.info.width,
                    height: self.info.height,
                    data: jpeg,
                    captured_at: Utc::now(),
                }));
            }

            let n = self
                .stdout
                .read(&mut self.buf)
                .await
                .map_err(|e| Error::Connection(format!("stream read failed: {}", e)))?;
            if n == 0 {
                return Ok(None);
            }
            self.splitter.push(&self.buf[..n]);
        }
    }

    async fn close(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

/// Most bytes held while waiting for an end-of-image marker
pub const MAX_BUFFERED_BYTES: usize = 8 * 1024 * 1024;

/// Cuts a concatenated JPEG byte stream into individual images
pub struct MjpegSplitter {
    buf: Vec<u8>,
    limit: usize,
}

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

impl Default for MjpegSplitter {
    fn default() -> Self {
        Self::with_limit(MAX_BUFFERED_BYTES)
    }
}

impl MjpegSplitter {
    pub fn with_limit(limit: usize) -> Self {
        Self { buf: Vec::new(), limit }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > self.limit {
            self.resync();
        }
    }

    /// Drop an image that never ended, keeping from the newest start marker
    fn resync(&mut self) {
        let newest = self.buf.windows(2).rposition(|w| w == SOI);
        match newest {
            Some(pos) if pos > 0 && self.buf.len() - pos <= self.limit => {
                self.buf.drain(..pos);
            }
            _ => self.buf.clear(),
        }
        tracing::warn!(kept = self.buf.len(), limit = self.limit, "MJPEG buffer overflow, resynchronised");
    }

    /// Pop the next complete JPEG, discarding any garbage before it
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let start = find_marker(&self.buf, SOI, 0)?;
        let end = find_marker(&self.buf, EOI, start + 2)? + 2;
        let frame = self.buf[start..end].to_vec();
        self.buf.drain(..end);
        Some(frame)
    }
}

fn find_marker(buf: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if buf.len() < from + 2 {
        return None;
    }
    buf[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|p| p + from)
}

/// Map ffmpeg/ffprobe stderr to a failure reason
pub fn classify_failure(stderr: &str) -> ConnectFailure {
    let s = stderr.to_lowercase();
    if s.contains("401") || s.contains("unauthorized") {
        ConnectFailure::Auth
    } else if s.contains("connection refused") {
        ConnectFailure::Refused
    } else if s.contains("no route to host") || s.contains("network is unreachable") {
        ConnectFailure::Unreachable
    } else if s.contains("timed out") || s.contains("timeout") {
        ConnectFailure::Timeout
    } else if s.contains("404") || s.contains("not found") {
        ConnectFailure::StreamNotFound
    } else {
        ConnectFailure::Other(stderr.trim().to_string())
    }
}

fn parse_stream_info(stdout: &[u8]) -> Option<StreamInfo> {
    let value: serde_json::Value = serde_json::from_slice(stdout).ok()?;
    let stream = value.get("streams")?.as_array()?.first()?;
    let width = stream.get("width")?.as_u64()? as u32;
    let height = stream.get("height")?.as_u64()? as u32;
    let fps = stream
        .get("r_frame_rate")
        .and_then(|r| r.as_str())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);
    Some(StreamInfo { width, height, fps })
}

fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(payload: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, payload, payload, 0xFF, 0xD9]
    }

    #[test]
    fn test_splitter_drops_unterminated_image() {
        let mut splitter = MjpegSplitter::with_limit(16);
        let mut runaway = vec![0xFF, 0xD8];
        runaway.extend(std::iter::repeat(0u8).take(20));
        splitter.push(&runaway);
        assert!(splitter.next_frame().is_none());

        splitter.push(&jpeg(3));
        assert_eq!(splitter.next_frame(), Some(jpeg(3)));
    }

    #[test]
    fn test_splitter_overflow_keeps_newest_image_start() {
        let mut splitter = MjpegSplitter::with_limit(16);
        let mut partial = vec![0xFF, 0xD8];
        partial.extend(std::iter::repeat(1u8).take(12));
        splitter.push(&partial);
        splitter.push(&jpeg(4));
        assert_eq!(splitter.next_frame(), Some(jpeg(4)));
        assert!(splitter.next_frame().is_none());
    }

    #[test]
    fn test_splitter_across_chunks() {
        let mut splitter = MjpegSplitter::default();
        let stream: Vec<u8> = [jpeg(1), jpeg(2)].concat();

        splitter.push(&stream[..4]);
        assert!(splitter.next_frame().is_none());

        splitter.push(&stream[4..]);
        assert_eq!(splitter.next_frame(), Some(jpeg(1)));
        assert_eq!(splitter.next_frame(), Some(jpeg(2)));
        assert!(splitter.next_frame().is_none());
    }

    #[test]
    fn test_splitter_skips_leading_garbage() {
        let mut splitter = MjpegSplitter::default();
        splitter.push(&[0x00, 0x13]);
        splitter.push(&jpeg(7));
        assert_eq!(splitter.next_frame(), Some(jpeg(7)));
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("method DESCRIBE failed: 401 Unauthorized"),
            ConnectFailure::Auth
        );
        assert_eq!(
            classify_failure("Connection to tcp://10.0.0.1:555 failed: Connection refused"),
            ConnectFailure::Refused
        );
        assert_eq!(
            classify_failure("Connection timed out"),
            ConnectFailure::Timeout
        );
        assert_eq!(
            classify_failure("method DESCRIBE failed: 404 Not Found"),
            ConnectFailure::StreamNotFound
        );
    }

    #[test]
    fn test_parse_stream_info() {
        let info = parse_stream_info(
            br#"{"streams":[{"width":1920,"height":1080,"r_frame_rate":"30000/1001"}]}"#,
        )
        .unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!((info.fps - 29.97).abs() < 0.01);

        assert!(parse_stream_info(br#"{"streams":[]}"#).is_none());
    }
}
