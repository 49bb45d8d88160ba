//! Durable progress record for resumable generation runs.
//!
//! The checkpoint is a small JSON file recording the highest contiguously
//! flushed input offset. It is written after each durable flush, deleted on
//! full completion, and read once at startup. Absence is not an error; it
//! means start from zero.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::error::GenerateError;

/// Progress record: every input row at index < `last_processed_index` has a
/// durably written embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Offset into the stably ordered input up to which output is durable
    pub last_processed_index: usize,

    /// When the checkpoint was written
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a checkpoint at the given offset, stamped now
    pub fn at(last_processed_index: usize) -> Self {
        Self {
            last_processed_index,
            timestamp: Utc::now(),
        }
    }
}

/// File-backed checkpoint store with atomic overwrite
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store over the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint, or `None` when no run has been recorded
    pub async fn load(&self) -> Result<Option<Checkpoint>, GenerateError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let checkpoint: Checkpoint = serde_json::from_str(&contents)
                    .map_err(|e| GenerateError::Checkpoint(format!("Malformed checkpoint: {}", e)))?;
                Ok(Some(checkpoint))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GenerateError::Io(e)),
        }
    }

    /// Overwrite the checkpoint atomically (write to a temp file, then rename)
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), GenerateError> {
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| GenerateError::Checkpoint(format!("Failed to encode checkpoint: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.path).await?;

        debug!(
            "Checkpoint saved at offset {}",
            checkpoint.last_processed_index
        );
        Ok(())
    }

    /// Remove the checkpoint after a fully successful run
    pub async fn clear(&self) -> Result<(), GenerateError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GenerateError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_absent_is_none() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_load_clear_round_trip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let checkpoint = Checkpoint::at(4200);
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.last_processed_index, 4200);

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        // Clearing twice is idempotent.
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        store.save(&Checkpoint::at(100)).await.unwrap();
        store.save(&Checkpoint::at(250)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.last_processed_index, 250);
    }
}
