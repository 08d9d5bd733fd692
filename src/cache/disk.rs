//! Cold tier: content-addressed artifact storage on disk
//!
//! Artifacts are stored gzip-compressed at paths derived from their
//! fingerprint, so the same fingerprint always lands on the same file. A
//! readable record is never rewritten.

use crate::cache::CachedArtifact;
use crate::error::StorageError;
use crate::fingerprint::Fingerprint;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use walkdir::WalkDir;

const ARTIFACT_EXTENSION: &str = "art";

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Record count and byte size of the cold tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub records: u64,
    pub bytes: u64,
}

/// Content-addressed artifact storage
///
/// Layout: `{root}/artifacts/{hex[0..2]}/{hex[2..4]}/{hex}.art`, which keeps
/// any single directory small even with hundreds of thousands of artifacts.
pub struct ColdStore {
    root: PathBuf,
    compression: Compression,
}

impl ColdStore {
    /// Open (and create if needed) a cold store under `root`.
    pub fn new<P: AsRef<Path>>(root: P, compression_level: u32) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        let artifacts_dir = root.join("artifacts");
        fs::create_dir_all(&artifacts_dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create artifacts directory at {:?}: {}",
                    artifacts_dir, e
                ),
            ))
        })?;

        Ok(Self {
            root,
            compression: Compression::new(compression_level.min(9)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an artifact.
    ///
    /// Writes go to a temporary file that is renamed into place. A readable
    /// record for the same fingerprint is left untouched; an unreadable one
    /// is replaced.
    pub fn store(&self, artifact: &CachedArtifact) -> Result<(), StorageError> {
        match self.get(&artifact.fingerprint) {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(err) => {
                warn!(
                    fingerprint = %artifact.fingerprint.short(),
                    error = %err,
                    "Replacing unreadable cold-tier record"
                );
            }
        }

        let path = self.artifact_path(&artifact.fingerprint);
        let temp_path = path.with_extension(format!(
            "{}.{}.{}.tmp",
            ARTIFACT_EXTENSION,
            std::process::id(),
            TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let encoded = bincode::serialize(artifact)
            .map_err(|e| StorageError::Serialization(format!("Failed to encode artifact: {}", e)))?;
        let mut encoder = GzEncoder::new(Vec::new(), self.compression);
        encoder.write_all(&encoded)?;
        let compressed = encoder.finish()?;

        fs::write(&temp_path, &compressed).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write artifact to {:?}: {}", temp_path, e),
            ))
        })?;

        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", path, e),
            ))
        })?;

        Ok(())
    }

    /// Retrieve an artifact by fingerprint
    ///
    /// Returns `None` if no record exists, and an error if the record exists
    /// but cannot be decoded or belongs to a different fingerprint.
    pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CachedArtifact>, StorageError> {
        let path = self.artifact_path(fingerprint);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| {
                StorageError::Serialization(format!("Failed to decompress {:?}: {}", path, e))
            })?;
        let artifact: CachedArtifact = bincode::deserialize(&decoded).map_err(|e| {
            StorageError::Serialization(format!("Failed to decode {:?}: {}", path, e))
        })?;

        if artifact.fingerprint != *fingerprint {
            return Err(StorageError::FingerprintMismatch {
                expected: *fingerprint,
                actual: artifact.fingerprint,
            });
        }

        Ok(Some(artifact))
    }

    /// Walk the tier and total its records.
    pub fn usage(&self) -> Result<DiskUsage, StorageError> {
        let mut usage = DiskUsage::default();
        for entry in WalkDir::new(self.root.join("artifacts")) {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
            let is_record = entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION);
            if is_record {
                usage.records += 1;
                usage.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(usage)
    }

    pub(crate) fn artifact_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let hex = fingerprint.to_hex();
        self.root
            .join("artifacts")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{}.{}", hex, ARTIFACT_EXTENSION))
    }
}
