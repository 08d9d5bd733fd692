//! Batch scheduling
//!
//! Runs entries one after another, skipping finished ones and carrying on
//! past failures. Running stats are flushed to disk periodically so an
//! interrupted batch still leaves an accurate record behind.

use crate::error::PipelineError;
use crate::generation::entry::EntryOrchestrator;
use crate::generation::job::EntrySpec;
use crate::generation::output::write_atomic;
use crate::progress::store::RunTotals;
use crate::progress::{EntryEventData, RunLedger, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub entry_id: String,
    pub error: String,
}

/// Persisted summary of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRunStats {
    #[serde(default)]
    pub run_id: Option<String>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub per_entry_errors: Vec<EntryError>,
}

impl BatchRunStats {
    fn new(total: usize) -> Self {
        Self {
            run_id: None,
            total,
            completed: 0,
            failed: 0,
            skipped: 0,
            started_at: Utc::now(),
            ended_at: None,
            per_entry_errors: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// Read stats written by a previous run, if any.
    pub fn load(path: &Path) -> Result<Option<Self>, PipelineError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PipelineError::Storage(e.into())),
        };
        serde_json::from_slice(&raw).map(Some).map_err(|e| {
            PipelineError::Storage(crate::error::StorageError::Serialization(format!(
                "Failed to decode batch stats {:?}: {}",
                path, e
            )))
        })
    }

    fn persist(&self, path: &Path) -> Result<(), PipelineError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| {
            PipelineError::Storage(crate::error::StorageError::Serialization(format!(
                "Failed to encode batch stats: {}",
                e
            )))
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::Storage(e.into()))?;
        }
        write_atomic(path, &bytes)?;
        Ok(())
    }
}

pub struct BatchScheduler {
    orchestrator: EntryOrchestrator,
    stats_path: PathBuf,
    flush_every: usize,
    ledger: Option<RunLedger>,
}

impl BatchScheduler {
    pub fn new(orchestrator: EntryOrchestrator, stats_path: impl Into<PathBuf>, flush_every: usize) -> Self {
        Self {
            orchestrator,
            stats_path: stats_path.into(),
            flush_every,
            ledger: None,
        }
    }

    /// Record runs and entry events in `ledger`.
    pub fn with_ledger(mut self, ledger: RunLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn orchestrator(&self) -> &EntryOrchestrator {
        &self.orchestrator
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }

    /// Run every entry in order. Entry failures are recorded, never propagated;
    /// only failing to persist the final stats is an error.
    pub async fn run(&self, entries: &[EntrySpec]) -> Result<BatchRunStats, PipelineError> {
        let mut stats = BatchRunStats::new(entries.len());
        stats.run_id = self.ledger_start(entries.len());
        info!(total = entries.len(), run_id = ?stats.run_id, "Batch started");

        for entry in entries {
            let started = Instant::now();
            let event = if self.orchestrator.outputs().exists(&entry.id) {
                stats.skipped += 1;
                if let Err(e) = self.orchestrator.checkpoints().delete(&entry.id) {
                    warn!(entry_id = %entry.id, error = %e, "Failed to remove stale checkpoint");
                }
                info!(entry_id = %entry.id, "Output exists, skipping");
                ("entry_skipped", EntryEventData::default())
            } else {
                match self.orchestrator.run(entry).await {
                    Ok(finished) => {
                        stats.completed += 1;
                        (
                            "entry_completed",
                            EntryEventData {
                                overall_score: Some(finished.report.overall_score),
                                tier: Some(finished.report.tier),
                                error: None,
                                duration_ms: Some(started.elapsed().as_millis() as u64),
                            },
                        )
                    }
                    Err(err) => {
                        warn!(entry_id = %entry.id, error = %err, "Entry failed, continuing");
                        stats.failed += 1;
                        stats.per_entry_errors.push(EntryError {
                            entry_id: entry.id.clone(),
                            error: err.to_string(),
                        });
                        (
                            "entry_failed",
                            EntryEventData {
                                error: Some(err.to_string()),
                                duration_ms: Some(started.elapsed().as_millis() as u64),
                                ..EntryEventData::default()
                            },
                        )
                    }
                }
            };
            self.ledger_event(stats.run_id.as_deref(), event.0, &entry.id, event.1);

            if self.flush_every > 0 && stats.processed() % self.flush_every == 0 {
                if let Err(e) = stats.persist(&self.stats_path) {
                    warn!(error = %e, "Failed to flush batch stats");
                }
            }
        }

        stats.ended_at = Some(Utc::now());
        stats.persist(&self.stats_path)?;
        self.ledger_finish(&stats);
        info!(
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            "Batch finished"
        );
        Ok(stats)
    }

    fn ledger_start(&self, total: usize) -> Option<String> {
        let ledger = self.ledger.as_ref()?;
        match ledger.mark_interrupted_runs() {
            Ok(0) => {}
            Ok(n) => info!(count = n, "Marked interrupted runs"),
            Err(e) => warn!(error = %e, "Failed to mark interrupted runs"),
        }
        ledger
            .start_run("batch", total)
            .map_err(|e| warn!(error = %e, "Run ledger unavailable"))
            .ok()
    }

    fn ledger_event(&self, run_id: Option<&str>, event_type: &str, entry_id: &str, data: EntryEventData) {
        let (Some(ledger), Some(run_id)) = (self.ledger.as_ref(), run_id) else {
            return;
        };
        let data = serde_json::to_value(data).unwrap_or_default();
        if let Err(e) = ledger.append(run_id, event_type, Some(entry_id), data) {
            warn!(error = %e, "Failed to record ledger event");
        }
    }

    fn ledger_finish(&self, stats: &BatchRunStats) {
        let (Some(ledger), Some(run_id)) = (self.ledger.as_ref(), stats.run_id.as_deref()) else {
            return;
        };
        let error = (stats.failed > 0).then(|| format!("{} entries failed", stats.failed));
        let totals = RunTotals {
            completed: stats.completed,
            failed: stats.failed,
            skipped: stats.skipped,
        };
        if let Err(e) = ledger.finish_run(run_id, RunStatus::Completed, totals, error) {
            warn!(error = %e, "Failed to finish ledger run");
        }
    }
}
