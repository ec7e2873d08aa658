//! ClipExtractor - cut a time range out of the segment archive
//!
//! One overlapping segment is trimmed; several are concatenated in
//! chronological order. Transcoder failures fall back to a raw copy
//! (whole segment, or the first of several). The output path depends only
//! on camera id and requested start, so re-extraction overwrites.

mod transcoder;

pub use transcoder::{CopyTranscoder, FfmpegTranscoder, Transcoder};

use crate::archive::{ArchiveIndex, SegmentFile};
use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// ClipExtractor instance
pub struct ClipExtractor {
    index: ArchiveIndex,
    transcoder: Arc<dyn Transcoder>,
}

impl ClipExtractor {
    pub fn new(index: ArchiveIndex, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { index, transcoder }
    }

    /// Clip covering `[start, end]`, or None when the archive has nothing for it
    pub async fn extract_clip(
        &self,
        camera_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Option<PathBuf> {
        if end <= start {
            tracing::warn!(camera_id = %camera_id, start = %start, end = %end, "Empty clip range");
            return None;
        }

        let mut segments = Vec::new();
        for segment in self.index.find_segments(camera_id, start, end).await {
            if tokio::fs::try_exists(&segment.path).await.unwrap_or(false) {
                segments.push(segment);
            } else {
                tracing::warn!(path = %segment.path.display(), "Indexed segment missing on disk");
            }
        }
        if segments.is_empty() {
            tracing::info!(camera_id = %camera_id, start = %start, end = %end, "No segments in range");
            return None;
        }

        let layout = self.index.layout();
        if let Err(e) = tokio::fs::create_dir_all(layout.clips_dir()).await {
            tracing::error!(error = %e, "Failed to create clips directory");
            return None;
        }
        let output = layout.clip_path(camera_id, start);

        let result = if let [segment] = segments.as_slice() {
            self.trim_single(segment, start, end, &output).await
        } else {
            let inputs: Vec<PathBuf> = segments.iter().map(|s| s.path.clone()).collect();
            self.transcoder.concat(&inputs, &output).await
        };

        if let Err(e) = result {
            tracing::warn!(camera_id = %camera_id, error = %e, "Transcode failed, copying first segment");
            if let Err(e) = tokio::fs::copy(&segments[0].path, &output).await {
                tracing::error!(camera_id = %camera_id, error = %e, "Clip copy failed");
                return None;
            }
        }

        tracing::info!(
            camera_id = %camera_id,
            path = %output.display(),
            segments = segments.len(),
            "Clip extracted"
        );
        Some(output)
    }

    async fn trim_single(
        &self,
        segment: &SegmentFile,
        start: NaiveDateTime,
        end: NaiveDateTime,
        output: &std::path::Path,
    ) -> crate::error::Result<()> {
        // Clamp to the segment first so arbitrarily wide requests cannot overflow
        let clip_start = start.max(segment.start);
        let clip_end = end.min(segment.end);
        let offset = (clip_start - segment.start).to_std().unwrap_or(Duration::ZERO);
        let duration = (clip_end - clip_start).to_std().unwrap_or(Duration::ZERO);
        self.transcoder
            .trim(&segment.path, offset, duration, output)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveLayout;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Trim { input: PathBuf, offset: Duration, duration: Duration },
        Concat { inputs: Vec<PathBuf> },
    }

    /// Records calls and writes a marker output
    #[derive(Default)]
    struct RecordingTranscoder {
        calls: Mutex<Vec<Call>>,
        fail: bool,
    }

    #[async_trait]
    impl Transcoder for RecordingTranscoder {
        async fn trim(&self, input: &Path, offset: Duration, duration: Duration, output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Trim {
                input: input.to_path_buf(),
                offset,
                duration,
            });
            if self.fail {
                return Err(Error::Transcoder("boom".to_string()));
            }
            tokio::fs::write(output, b"trimmed").await?;
            Ok(())
        }

        async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Concat { inputs: inputs.to_vec() });
            if self.fail {
                return Err(Error::Transcoder("boom".to_string()));
            }
            tokio::fs::write(output, b"joined").await?;
            Ok(())
        }

        async fn frame_at(&self, _input: &Path, _offset: Duration) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    async fn setup(transcoder: Arc<RecordingTranscoder>) -> (tempfile::TempDir, ClipExtractor, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(dir.path(), "mp4", 600);
        let mut paths = Vec::new();
        for (i, start) in [at(10, 0, 0), at(10, 10, 0)].into_iter().enumerate() {
            let path = layout.segment_path("cam-1", start);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(&path, format!("segment-{}", i)).await.unwrap();
            paths.push(path);
        }
        let extractor = ClipExtractor::new(ArchiveIndex::new(layout), transcoder);
        (dir, extractor, paths)
    }

    #[tokio::test]
    async fn test_no_segments_returns_none() {
        let transcoder = Arc::new(RecordingTranscoder::default());
        let (_dir, extractor, _) = setup(transcoder.clone()).await;

        assert!(extractor.extract_clip("cam-1", at(12, 0, 0), at(12, 5, 0)).await.is_none());
        assert!(extractor.extract_clip("cam-9", at(10, 0, 0), at(10, 5, 0)).await.is_none());
        assert!(transcoder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_segment_is_trimmed() {
        let transcoder = Arc::new(RecordingTranscoder::default());
        let (dir, extractor, paths) = setup(transcoder.clone()).await;

        let clip = extractor
            .extract_clip("cam-1", at(10, 2, 0), at(10, 3, 30))
            .await
            .unwrap();
        assert_eq!(clip, dir.path().join("clips").join("clip_cam-1_20240305_100200.mp4"));
        assert_eq!(tokio::fs::read(&clip).await.unwrap(), b"trimmed");

        let calls = transcoder.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![Call::Trim {
                input: paths[0].clone(),
                offset: Duration::from_secs(120),
                duration: Duration::from_secs(90),
            }]
        );
    }

    #[tokio::test]
    async fn test_unbounded_range_is_clamped_to_segment() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(dir.path(), "mp4", 600);
        let path = layout.segment_path("cam-1", at(10, 0, 0));
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"raw").await.unwrap();

        let transcoder = Arc::new(RecordingTranscoder::default());
        let extractor = ClipExtractor::new(ArchiveIndex::new(layout), transcoder.clone());
        assert!(extractor
            .extract_clip("cam-1", NaiveDateTime::MIN, NaiveDateTime::MAX)
            .await
            .is_some());
        assert_eq!(
            transcoder.calls.lock().unwrap().clone(),
            vec![Call::Trim {
                input: path,
                offset: Duration::ZERO,
                duration: Duration::from_secs(600),
            }]
        );
    }

    #[tokio::test]
    async fn test_multiple_segments_concatenated_in_order() {
        let transcoder = Arc::new(RecordingTranscoder::default());
        let (_dir, extractor, paths) = setup(transcoder.clone()).await;

        let clip = extractor
            .extract_clip("cam-1", at(10, 8, 0), at(10, 12, 0))
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&clip).await.unwrap(), b"joined");
        assert_eq!(
            transcoder.calls.lock().unwrap().clone(),
            vec![Call::Concat { inputs: paths }]
        );
    }

    #[tokio::test]
    async fn test_transcoder_failure_copies_first_segment() {
        let transcoder = Arc::new(RecordingTranscoder { fail: true, ..Default::default() });
        let (_dir, extractor, _) = setup(transcoder).await;

        let clip = extractor
            .extract_clip("cam-1", at(10, 8, 0), at(10, 12, 0))
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&clip).await.unwrap(), b"segment-0");
    }

    #[tokio::test]
    async fn test_reextraction_overwrites_same_path() {
        let (_dir, extractor, _) = setup(Arc::new(RecordingTranscoder::default())).await;
        let a = extractor.extract_clip("cam-1", at(10, 1, 0), at(10, 2, 0)).await;
        let b = extractor.extract_clip("cam-1", at(10, 1, 0), at(10, 2, 0)).await;
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_copy_transcoder_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(dir.path(), "mp4", 600);
        let path = layout.segment_path("cam-1", at(10, 0, 0));
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"raw").await.unwrap();

        let extractor = ClipExtractor::new(ArchiveIndex::new(layout), Arc::new(CopyTranscoder));
        let clip = extractor
            .extract_clip("cam-1", at(10, 1, 0), at(10, 2, 0))
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&clip).await.unwrap(), b"raw");
    }
}
