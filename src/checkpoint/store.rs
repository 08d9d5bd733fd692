//! Durable checkpoint files
//!
//! One JSON file per entry. A save writes `{name}.json.tmp`, moves the current
//! primary aside to `{name}.json.bak` and renames the temp file into place, so
//! a crash at any point leaves either the new or the previous snapshot
//! readable. Loading never fails: unreadable, corrupt or foreign files fall
//! back to the backup, then to "no checkpoint".

use crate::checkpoint::{EntryCheckpoint, CHECKPOINT_SCHEMA_VERSION};
use crate::error::StorageError;
use crate::fingerprint::record_name;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create checkpoint directory at {:?}: {}", dir, e),
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically replace the entry's checkpoint. Fields are written as given.
    pub fn save(&self, checkpoint: &EntryCheckpoint) -> Result<(), StorageError> {
        let primary = self.primary_path(&checkpoint.entry_id);
        let backup = self.backup_path(&checkpoint.entry_id);
        let temp = self.temp_path(&checkpoint.entry_id);

        let json = serde_json::to_vec_pretty(checkpoint).map_err(|e| {
            StorageError::Serialization(format!("Failed to encode checkpoint: {}", e))
        })?;
        fs::write(&temp, json)?;

        if primary.exists() {
            if let Err(e) = fs::rename(&primary, &backup) {
                let _ = fs::remove_file(&temp);
                return Err(e.into());
            }
        }
        fs::rename(&temp, &primary).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to move checkpoint into place at {:?}: {}", primary, e),
            ))
        })?;

        debug!(
            entry_id = %checkpoint.entry_id,
            phase = ?checkpoint.phase,
            done = checkpoint.done_count(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Latest readable checkpoint for `entry_id`, if any.
    pub fn load(&self, entry_id: &str) -> Option<EntryCheckpoint> {
        match read_checkpoint(&self.primary_path(entry_id), entry_id) {
            Ok(checkpoint) => return Some(checkpoint),
            Err(LoadFailure::Missing) => {}
            Err(LoadFailure::Unusable(reason)) => {
                warn!(entry_id, reason = %reason, "Primary checkpoint unusable, trying backup");
            }
        }

        match read_checkpoint(&self.backup_path(entry_id), entry_id) {
            Ok(checkpoint) => Some(checkpoint),
            Err(LoadFailure::Missing) => None,
            Err(LoadFailure::Unusable(reason)) => {
                warn!(entry_id, reason = %reason, "Backup checkpoint unusable, starting fresh");
                None
            }
        }
    }

    pub fn delete(&self, entry_id: &str) -> Result<(), StorageError> {
        for path in [
            self.primary_path(entry_id),
            self.backup_path(entry_id),
            self.temp_path(entry_id),
        ] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Entry ids with a loadable checkpoint, sorted.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            let is_primary = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".json"))
                .unwrap_or(false);
            if !is_primary {
                continue;
            }
            let Ok(bytes) = fs::read(&path) else { continue };
            if let Ok(checkpoint) = serde_json::from_slice::<EntryCheckpoint>(&bytes) {
                if checkpoint.schema_version == CHECKPOINT_SCHEMA_VERSION {
                    ids.push(checkpoint.entry_id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn primary_path(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", record_name(entry_id)))
    }

    fn backup_path(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json.bak", record_name(entry_id)))
    }

    fn temp_path(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", record_name(entry_id)))
    }
}

enum LoadFailure {
    Missing,
    Unusable(String),
}

fn read_checkpoint(path: &Path, entry_id: &str) -> Result<EntryCheckpoint, LoadFailure> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(LoadFailure::Missing),
        Err(e) => return Err(LoadFailure::Unusable(format!("read {:?}: {}", path, e))),
    };
    let checkpoint: EntryCheckpoint = serde_json::from_slice(&bytes)
        .map_err(|e| LoadFailure::Unusable(format!("decode {:?}: {}", path, e)))?;
    if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
        return Err(LoadFailure::Unusable(format!(
            "schema version {} (expected {})",
            checkpoint.schema_version, CHECKPOINT_SCHEMA_VERSION
        )));
    }
    if checkpoint.entry_id != entry_id {
        return Err(LoadFailure::Unusable(format!(
            "belongs to entry '{}'",
            checkpoint.entry_id
        )));
    }
    Ok(checkpoint)
}
