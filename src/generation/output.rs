//! Finished-entry documents.
//!
//! Each finished entry is written as `{name}.md` plus `{name}.report.json`.
//! The report lands first, so a present document always has its report, and
//! the document's existence is what marks the entry finished.

use crate::error::StorageError;
use crate::fingerprint::record_name;
use crate::validation::ValidationReport;
use std::fs;
use std::path::{Path, PathBuf};

pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self, entry_id: &str) -> bool {
        self.document_path(entry_id).is_file()
    }

    pub fn document_path(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{}.md", record_name(entry_id)))
    }

    pub fn report_path(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{}.report.json", record_name(entry_id)))
    }

    /// Write document and report atomically. Returns the document path.
    pub fn write(
        &self,
        entry_id: &str,
        document: &str,
        report: &ValidationReport,
    ) -> Result<PathBuf, StorageError> {
        let report_json = serde_json::to_vec_pretty(report)
            .map_err(|e| StorageError::Serialization(format!("Failed to encode report: {}", e)))?;
        write_atomic(&self.report_path(entry_id), &report_json)?;

        let document_path = self.document_path(entry_id);
        write_atomic(&document_path, document.as_bytes())?;
        Ok(document_path)
    }

    pub fn read(&self, entry_id: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.document_path(entry_id)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of finished documents in the output directory.
    pub fn count(&self) -> Result<usize, StorageError> {
        let mut count = 0;
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Write via a sibling temp file and rename into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output");
    let temp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to move {:?} into place: {}", path, e),
        ))
    })
}
