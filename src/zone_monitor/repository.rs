//! Zone definitions on disk
//!
//! A single JSON document `{ "zones": [...], "next_id": n }`, rewritten
//! whole on every create and delete.

use super::types::Zone;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub zones: Vec<Zone>,
    pub next_id: u64,
}

impl Default for ZoneSnapshot {
    fn default() -> Self {
        Self { zones: Vec::new(), next_id: 1 }
    }
}

/// JSON file zone store
#[derive(Debug, Clone)]
pub struct ZoneFileStore {
    path: PathBuf,
}

impl ZoneFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; a missing file is an empty store
    pub async fn load(&self) -> Result<ZoneSnapshot> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ZoneSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&data)
            .map_err(|e| Error::Config(format!("{}: {}", self.path.display(), e)))
    }

    /// Replace the file atomically
    pub async fn save(&self, snapshot: &ZoneSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
