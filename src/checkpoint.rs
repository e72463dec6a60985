// ABOUTME: Per-table progress checkpoints persisted as JSON files
// ABOUTME: Lets an interrupted table transfer resume from its last committed offset

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CHECKPOINT_SUFFIX: &str = "_progress.json";

/// Last committed position of one table transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCheckpoint {
    pub table_name: String,
    /// 0-based row offset of the next row to transfer
    #[serde(rename = "currentIndex")]
    pub cursor: u64,
    pub total_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// Directory of checkpoint files, one per table
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checkpoint file for `table`
    ///
    /// The name is percent-encoded, so path separators stay inside the
    /// directory and two distinct tables never share a file.
    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}", urlencoding::encode(table), CHECKPOINT_SUFFIX))
    }

    /// Durably overwrite the checkpoint for `table`
    ///
    /// Written to a temp file in the same directory and renamed into place,
    /// so a crash mid-write leaves the previous checkpoint intact.
    pub fn save(&self, table: &str, cursor: u64, total: u64) -> Result<ProgressCheckpoint> {
        let checkpoint = ProgressCheckpoint {
            table_name: table.to_string(),
            cursor: cursor.min(total),
            total_count: total,
            timestamp: Utc::now(),
        };

        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create checkpoint directory {}", self.dir.display())
        })?;

        let path = self.path_for(table);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).with_context(|| {
            format!("Failed to create temp checkpoint in {}", self.dir.display())
        })?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &checkpoint)
            .with_context(|| format!("Failed to serialize checkpoint at {}", path.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to flush checkpoint at {}", path.display()))?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist checkpoint at {}", path.display()))?;

        Ok(checkpoint)
    }

    /// Load the checkpoint for `table`
    ///
    /// Missing, unreadable, or malformed files all count as "no checkpoint".
    pub fn load(&self, table: &str) -> Option<ProgressCheckpoint> {
        let path = self.path_for(table);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(table, path = %path.display(), error = %e, "Ignoring unreadable checkpoint");
                return None;
            }
        };
        match serde_json::from_str::<ProgressCheckpoint>(&content) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                tracing::warn!(table, path = %path.display(), error = %e, "Ignoring malformed checkpoint");
                None
            }
        }
    }

    /// Remove the checkpoint for `table`; a missing file is not an error
    pub fn clear(&self, table: &str) {
        let path = self.path_for(table);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(table, path = %path.display(), error = %e, "Failed to remove checkpoint");
            }
        }
    }

    /// All readable checkpoints in the directory, ordered by table name
    pub fn list(&self) -> Result<Vec<ProgressCheckpoint>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read checkpoint directory {}", self.dir.display())
                })
            }
        };

        let mut checkpoints = Vec::new();
        for entry in entries {
            let entry = entry.context("Failed to read checkpoint directory entry")?;
            let path = entry.path();
            let is_checkpoint = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(CHECKPOINT_SUFFIX))
                .unwrap_or(false);
            if !is_checkpoint {
                continue;
            }
            if let Some(checkpoint) = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<ProgressCheckpoint>(&c).ok())
            {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(checkpoints)
    }
}
