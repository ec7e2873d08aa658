//! FrameExtractor - still frames out of the segment archive
//!
//! ## Responsibilities
//!
//! - JPEG snapshot of one camera at a past timestamp
//! - Frames sampled at a fixed interval over a time range
//!
//! Decoding goes through the clip [`Transcoder`], so without ffmpeg every
//! lookup comes back empty.

use crate::archive::{ArchiveIndex, SegmentFile};
use crate::clip_extractor::Transcoder;
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on frames returned by one `extract_frames` call
pub const MAX_FRAMES_PER_REQUEST: usize = 300;

/// One decoded still
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedFrame {
    pub camera_id: String,
    pub timestamp: NaiveDateTime,
    #[serde(skip)]
    pub jpeg: Vec<u8>,
    pub size_bytes: usize,
}

/// FrameExtractor instance
pub struct FrameExtractor {
    index: ArchiveIndex,
    transcoder: Arc<dyn Transcoder>,
}

impl FrameExtractor {
    pub fn new(index: ArchiveIndex, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { index, transcoder }
    }

    /// JPEG of the recorded frame at `timestamp`, or None when nothing covers it
    pub async fn snapshot(&self, camera_id: &str, timestamp: NaiveDateTime) -> Option<Vec<u8>> {
        let slack = chrono::Duration::seconds(1);
        let from = timestamp.checked_sub_signed(slack).unwrap_or(timestamp);
        let to = timestamp.checked_add_signed(slack).unwrap_or(timestamp);

        let segments = self.index.find_segments(camera_id, from, to).await;
        // Latest segment that started at or before the timestamp
        let segment = segments
            .iter()
            .rev()
            .find(|s| s.start <= timestamp)
            .or_else(|| segments.first())?;

        let offset = (timestamp.max(segment.start) - segment.start)
            .to_std()
            .unwrap_or(Duration::ZERO);
        match self.grab(segment, offset).await {
            Some(jpeg) => {
                tracing::debug!(camera_id = %camera_id, timestamp = %timestamp, size = jpeg.len(), "Snapshot extracted");
                Some(jpeg)
            }
            None => {
                tracing::info!(camera_id = %camera_id, timestamp = %timestamp, "No frame at timestamp");
                None
            }
        }
    }

    /// Frames every `interval` from each segment's start, kept when inside `[start, end]`
    pub async fn extract_frames(
        &self,
        camera_id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        interval: Duration,
    ) -> Result<Vec<ExtractedFrame>> {
        if interval.is_zero() {
            return Err(Error::Validation("frame interval must be positive".to_string()));
        }
        if end < start {
            return Err(Error::Validation("end is before start".to_string()));
        }
        let step = chrono::Duration::from_std(interval)
            .map_err(|_| Error::Validation("frame interval too large".to_string()))?;

        let mut frames = Vec::new();
        'segments: for segment in self.index.find_segments(camera_id, start, end).await {
            let mut at = segment.start;
            // Half-open so the boundary with the next segment is sampled once
            while at < segment.end && at <= end {
                if at >= start {
                    let offset = (at - segment.start).to_std().unwrap_or(Duration::ZERO);
                    let Some(jpeg) = self.grab(&segment, offset).await else {
                        // Past the real end of this file
                        break;
                    };
                    frames.push(ExtractedFrame {
                        camera_id: camera_id.to_string(),
                        timestamp: at,
                        size_bytes: jpeg.len(),
                        jpeg,
                    });
                    if frames.len() >= MAX_FRAMES_PER_REQUEST {
                        tracing::warn!(camera_id = %camera_id, limit = MAX_FRAMES_PER_REQUEST, "Frame limit reached");
                        break 'segments;
                    }
                }
                match at.checked_add_signed(step) {
                    Some(next) => at = next,
                    None => break,
                }
            }
        }

        tracing::info!(camera_id = %camera_id, count = frames.len(), "Frames extracted");
        Ok(frames)
    }

    async fn grab(&self, segment: &SegmentFile, offset: Duration) -> Option<Vec<u8>> {
        match self.transcoder.frame_at(&segment.path, offset).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(path = %segment.path.display(), error = %e, "Frame decode failed");
                None
            }
        }
    }
}
