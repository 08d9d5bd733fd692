//! Durable sled-backed run ledger.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::{Db, Tree};

use crate::error::StorageError;
use crate::progress::event::{RunEvent, RunStatus};
use crate::progress::{new_run_id, now_millis};

const TREE_RUNS: &str = "ledger_runs";
const TREE_EVENTS: &str = "ledger_events";
const TREE_SEQ: &str = "ledger_next_seq";
const EVENT_KEY_PAD: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub command: String,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub status: RunStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub error: Option<String>,
}

/// Final counts recorded when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct RunLedger {
    db: Db,
    runs: Tree,
    events: Tree,
    seq: Tree,
}

impl RunLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(to_storage_io)?;
        Self::new(db)
    }

    pub fn new(db: Db) -> Result<Self, StorageError> {
        let runs = db.open_tree(TREE_RUNS).map_err(to_storage_io)?;
        let events = db.open_tree(TREE_EVENTS).map_err(to_storage_io)?;
        let seq = db.open_tree(TREE_SEQ).map_err(to_storage_io)?;
        Ok(Self {
            db,
            runs,
            events,
            seq,
        })
    }

    /// Record a new active run and its `run_started` event.
    pub fn start_run(&self, command: &str, total: usize) -> Result<String, StorageError> {
        let run_id = new_run_id();
        let record = RunRecord {
            run_id: run_id.clone(),
            command: command.to_string(),
            started_at_ms: now_millis(),
            ended_at_ms: None,
            status: RunStatus::Active,
            total,
            completed: 0,
            failed: 0,
            skipped: 0,
            error: None,
        };
        self.put_run(&record)?;
        self.append(
            &run_id,
            "run_started",
            None,
            serde_json::json!({ "command": command, "total": total }),
        )?;
        Ok(run_id)
    }

    /// Append an event; returns its sequence number within the run.
    pub fn append(
        &self,
        run_id: &str,
        event_type: &str,
        entry_id: Option<&str>,
        data: Value,
    ) -> Result<u64, StorageError> {
        let seq = self.next_seq(run_id)?;
        let event = RunEvent {
            ts_ms: now_millis(),
            run_id: run_id.to_string(),
            seq,
            event_type: event_type.to_string(),
            entry_id: entry_id.map(str::to_string),
            data,
        };
        let value = serde_json::to_vec(&event).map_err(to_storage_data)?;
        self.events
            .insert(encode_event_key(run_id, seq).as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(seq)
    }

    pub fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        totals: RunTotals,
        error: Option<String>,
    ) -> Result<(), StorageError> {
        let Some(mut record) = self.get_run(run_id)? else {
            return Err(StorageError::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown run '{}'", run_id),
            )));
        };
        record.status = status;
        record.ended_at_ms = Some(now_millis());
        record.completed = totals.completed;
        record.failed = totals.failed;
        record.skipped = totals.skipped;
        record.error = error;
        self.put_run(&record)?;
        self.append(
            run_id,
            "run_ended",
            None,
            serde_json::json!({ "status": status.as_str() }),
        )?;
        self.flush()
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, StorageError> {
        let Some(raw) = self.runs.get(run_id.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(to_storage_data)?;
        Ok(Some(parsed))
    }

    /// All runs, most recent first.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>, StorageError> {
        let mut out = Vec::new();
        for result in self.runs.iter() {
            let (_, value) = result.map_err(to_storage_io)?;
            let rec: RunRecord = serde_json::from_slice(&value).map_err(to_storage_data)?;
            out.push(rec);
        }
        out.sort_by(|a, b| {
            b.started_at_ms
                .cmp(&a.started_at_ms)
                .then_with(|| b.run_id.cmp(&a.run_id))
        });
        Ok(out)
    }

    pub fn read_events(&self, run_id: &str) -> Result<Vec<RunEvent>, StorageError> {
        let prefix = format!("{run_id}:");
        let mut out = Vec::new();
        for result in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result.map_err(to_storage_io)?;
            out.push(serde_json::from_slice::<RunEvent>(&value).map_err(to_storage_data)?);
        }
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }

    /// Mark runs left active by a killed process as interrupted.
    pub fn mark_interrupted_runs(&self) -> Result<usize, StorageError> {
        let mut changed = 0usize;
        for mut run in self.list_runs()? {
            if run.status == RunStatus::Active {
                run.status = RunStatus::Interrupted;
                self.put_run(&run)?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Keep the newest `keep` finished runs; delete older ones with their events.
    pub fn prune(&self, keep: usize) -> Result<usize, StorageError> {
        let finished: Vec<RunRecord> = self
            .list_runs()?
            .into_iter()
            .filter(|r| r.status != RunStatus::Active)
            .collect();
        let mut removed = 0usize;
        for run in finished.iter().skip(keep) {
            self.delete_run(&run.run_id)?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn delete_run(&self, run_id: &str) -> Result<(), StorageError> {
        self.runs.remove(run_id.as_bytes()).map_err(to_storage_io)?;
        self.seq.remove(run_id.as_bytes()).map_err(to_storage_io)?;
        let prefix = format!("{run_id}:");
        let keys: Vec<Vec<u8>> = self
            .events
            .scan_prefix(prefix.as_bytes())
            .filter_map(|r| r.ok().map(|(k, _)| k.to_vec()))
            .collect();
        for key in keys {
            self.events.remove(key).map_err(to_storage_io)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }

    fn put_run(&self, record: &RunRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record).map_err(to_storage_data)?;
        self.runs
            .insert(record.run_id.as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(())
    }

    fn next_seq(&self, run_id: &str) -> Result<u64, StorageError> {
        let updated = self
            .seq
            .update_and_fetch(run_id.as_bytes(), |old| {
                let current = old
                    .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                    .map(u64::from_be_bytes)
                    .unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            })
            .map_err(to_storage_io)?;
        Ok(updated
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(1))
    }
}

fn encode_event_key(run_id: &str, seq: u64) -> String {
    format!("{run_id}:{seq:0EVENT_KEY_PAD$}")
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: serde_json::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
