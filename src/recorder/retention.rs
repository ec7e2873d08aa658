//! Archive retention
//!
//! Whole day directories older than the retention window are deleted.
//! The clips directory and anything that is not a day directory is left alone.

use crate::archive::{parse_day_dir, ArchiveLayout, CLIPS_DIR};
use crate::error::Result;
use chrono::NaiveDate;
use tokio::fs;

/// Remove day directories dated before `today - retention_days`.
/// Returns the number of directories removed.
pub async fn cleanup_old_archives(
    layout: &ArchiveLayout,
    retention_days: u32,
    today: NaiveDate,
) -> Result<usize> {
    let cutoff = today - chrono::Duration::days(retention_days as i64);
    let root = layout.root();

    let mut cameras = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(camera) = cameras.next_entry().await? {
        if camera.file_name() == CLIPS_DIR || !camera.file_type().await?.is_dir() {
            continue;
        }

        let mut days = fs::read_dir(camera.path()).await?;
        while let Some(day) = days.next_entry().await? {
            let Some(date) = day.file_name().to_str().and_then(parse_day_dir) else {
                continue;
            };
            if date >= cutoff {
                continue;
            }

            match fs::remove_dir_all(day.path()).await {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(path = %day.path().display(), "Removed expired archive");
                }
                Err(e) => {
                    tracing::error!(path = %day.path().display(), error = %e, "Failed to remove archive");
                }
            }
        }
    }

    Ok(removed)
}
