//! Transcoder seam: trim and concatenate without re-encoding, grab single
//! frames as JPEG

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Cut `duration` starting `offset` into `input`
    async fn trim(&self, input: &Path, offset: Duration, duration: Duration, output: &Path) -> Result<()>;

    /// Join `inputs` in order
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// JPEG of the frame `offset` into `input`; None past the end of the file
    async fn frame_at(&self, input: &Path, offset: Duration) -> Result<Option<Vec<u8>>>;
}

/// Raw copy: trim copies the whole input, concat copies the first input
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn trim(&self, input: &Path, _offset: Duration, _duration: Duration, output: &Path) -> Result<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let first = inputs
            .first()
            .ok_or_else(|| Error::Validation("nothing to concatenate".to_string()))?;
        tokio::fs::copy(first, output).await?;
        Ok(())
    }

    async fn frame_at(&self, input: &Path, _offset: Duration) -> Result<Option<Vec<u8>>> {
        Err(Error::Transcoder(format!(
            "cannot decode {} without ffmpeg",
            input.display()
        )))
    }
}

/// ffmpeg stream copy. Falls back to [`CopyTranscoder`] when the binary is missing.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    available: OnceCell<bool>,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            available: OnceCell::new(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Checked once; the first negative result is logged, later calls are silent
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let ok = Command::new(&self.ffmpeg_path)
                    .arg("-version")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                    .map(|s| s.success())
                    .unwrap_or(false);
                if !ok {
                    tracing::warn!(ffmpeg = %self.ffmpeg_path, "ffmpeg not found, clips will be raw segment copies");
                }
                ok
            })
            .await
    }

    /// Run ffmpeg and return its stdout
    async fn run(&self, args: Vec<String>) -> Result<Vec<u8>> {
        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transcoder(format!("ffmpeg spawn failed: {}", e)))?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(output.stdout),
            Ok(Ok(output)) => Err(Error::Transcoder(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
            Ok(Err(e)) => Err(Error::Transcoder(format!("ffmpeg failed: {}", e))),
            Err(_) => Err(Error::Transcoder(format!(
                "ffmpeg timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn trim(&self, input: &Path, offset: Duration, duration: Duration, output: &Path) -> Result<()> {
        if !self.is_available().await {
            return CopyTranscoder.trim(input, offset, duration, output).await;
        }

        self.run(vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-ss".into(),
            format!("{:.3}", offset.as_secs_f64()),
            "-i".into(),
            input.to_string_lossy().to_string(),
            "-t".into(),
            format!("{:.3}", duration.as_secs_f64()),
            "-c".into(),
            "copy".into(),
            output.to_string_lossy().to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if !self.is_available().await {
            return CopyTranscoder.concat(inputs, output).await;
        }

        let list_dir = output.parent().unwrap_or_else(|| Path::new("."));
        let list_path = list_dir.join(format!("concat_{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&list_path, concat_list(inputs)).await?;

        let result = self
            .run(vec![
                "-y".into(),
                "-loglevel".into(),
                "error".into(),
                "-f".into(),
                "concat".into(),
                "-safe".into(),
                "0".into(),
                "-i".into(),
                list_path.to_string_lossy().to_string(),
                "-c".into(),
                "copy".into(),
                output.to_string_lossy().to_string(),
            ])
            .await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            tracing::debug!(path = %list_path.display(), error = %e, "Concat list cleanup failed");
        }
        result.map(|_| ())
    }

    async fn frame_at(&self, input: &Path, offset: Duration) -> Result<Option<Vec<u8>>> {
        if !self.is_available().await {
            return CopyTranscoder.frame_at(input, offset).await;
        }

        let jpeg = self
            .run(vec![
                "-loglevel".into(),
                "error".into(),
                "-ss".into(),
                format!("{:.3}", offset.as_secs_f64()),
                "-i".into(),
                input.to_string_lossy().to_string(),
                "-frames:v".into(),
                "1".into(),
                "-q:v".into(),
                "3".into(),
                "-f".into(),
                "image2".into(),
                "-c:v".into(),
                "mjpeg".into(),
                "-".into(),
            ])
            .await?;
        Ok(if jpeg.is_empty() { None } else { Some(jpeg) })
    }
}

/// ffmpeg concat demuxer input list
fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}
