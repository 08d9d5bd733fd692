//! CLI route: single route table and run context. Dispatches to pipeline services and presentation.

use crate::cache::ColdStore;
use crate::checkpoint::CheckpointStore;
use crate::cli::help::command_name;
use crate::cli::output::CommandOutput;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_batch_stats, format_events, format_finished_entry, format_report_text, format_runs,
    format_workspace_stats, to_json, WorkspaceStats,
};
use crate::config::{ConfigLoader, QuireConfig, StoragePaths};
use crate::error::{PipelineError, StorageError};
use crate::generation::{BatchRunStats, BatchScheduler, EntryOrchestrator, EntrySpec, JobSpec, OutputStore};
use crate::progress::RunLedger;
use crate::validation::SectionContext;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace, resolved configuration and storage paths.
pub struct RunContext {
    workspace_root: PathBuf,
    config: QuireConfig,
    paths: StoragePaths,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self::with_config(workspace_root, config.validated()?))
    }

    pub fn with_config(workspace_root: PathBuf, config: QuireConfig) -> Self {
        let paths = config.storage.resolve(&workspace_root);
        Self {
            workspace_root,
            config,
            paths,
        }
    }

    pub fn config(&self) -> &QuireConfig {
        &self.config
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn execute(&self, command: &Commands) -> Result<CommandOutput, PipelineError> {
        let started = Instant::now();
        let name = command_name(command);
        info!(command = name, "Command started");
        let result = self.execute_inner(command);
        match &result {
            Ok(output) => info!(
                command = name,
                success = output.success,
                duration_ms = started.elapsed().as_millis() as u64,
                "Command finished"
            ),
            Err(e) => warn!(command = name, error = %e, "Command failed"),
        }
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<CommandOutput, PipelineError> {
        match command {
            Commands::Generate { job, entry, format } => self.handle_generate(job, entry, format),
            Commands::Batch { job, only, format } => self.handle_batch(job, only, format),
            Commands::Stats { format } => self.handle_stats(format),
            Commands::Score {
                file,
                entry,
                format,
            } => self.handle_score(file, *entry, format),
            Commands::Reset { entry, output } => self.handle_reset(entry, *output),
            Commands::Runs {
                limit,
                prune,
                events,
                format,
            } => self.handle_runs(*limit, *prune, events.as_deref(), format),
        }
    }

    fn orchestrator(&self, job: JobSpec) -> Result<EntryOrchestrator, PipelineError> {
        let backend = self.config.backend.build()?;
        EntryOrchestrator::from_config(&self.config, &self.workspace_root, job, backend)
    }

    fn handle_generate(
        &self,
        job_path: &Path,
        entry_id: &str,
        format: &str,
    ) -> Result<CommandOutput, PipelineError> {
        let job = JobSpec::load(job_path)?;
        let entry = job
            .entry(entry_id)
            .cloned()
            .ok_or_else(|| PipelineError::InvalidJob(format!("Unknown entry '{}'", entry_id)))?;
        let orchestrator = self.orchestrator(job)?;
        let finished = runtime()?.block_on(orchestrator.run(&entry))?;
        Ok(CommandOutput::ok(format_finished_entry(&finished, format)?))
    }

    fn handle_batch(
        &self,
        job_path: &Path,
        only: &[String],
        format: &str,
    ) -> Result<CommandOutput, PipelineError> {
        let job = JobSpec::load(job_path)?;
        let entries: Vec<EntrySpec> = if only.is_empty() {
            job.entries.clone()
        } else {
            let mut selected = Vec::with_capacity(only.len());
            for id in only {
                let entry = job
                    .entry(id)
                    .cloned()
                    .ok_or_else(|| PipelineError::InvalidJob(format!("Unknown entry '{}'", id)))?;
                selected.push(entry);
            }
            selected
        };

        let mut scheduler = BatchScheduler::new(
            self.orchestrator(job)?,
            &self.paths.stats,
            self.config.batch.stats_flush_every,
        );
        if self.config.batch.ledger {
            match RunLedger::open(&self.paths.ledger) {
                Ok(ledger) => scheduler = scheduler.with_ledger(ledger),
                Err(e) => warn!(error = %e, "Run ledger unavailable, continuing without it"),
            }
        }

        let stats = runtime()?.block_on(scheduler.run(&entries))?;
        let text = format_batch_stats(&stats, format)?;
        Ok(if stats.failed == 0 {
            CommandOutput::ok(text)
        } else {
            CommandOutput::failed(text)
        })
    }

    fn handle_stats(&self, format: &str) -> Result<CommandOutput, PipelineError> {
        let cold = ColdStore::new(&self.paths.cache, self.config.cache.compression_level)?;
        let stats = WorkspaceStats {
            disk: cold.usage()?,
            checkpoints: CheckpointStore::new(&self.paths.checkpoints)?.list()?,
            finished_documents: OutputStore::new(&self.paths.output)?.count()?,
            last_batch: BatchRunStats::load(&self.paths.stats)?,
        };
        Ok(CommandOutput::ok(format_workspace_stats(&stats, format)?))
    }

    fn handle_score(
        &self,
        file: &Path,
        whole_entry: bool,
        format: &str,
    ) -> Result<CommandOutput, PipelineError> {
        let text = std::fs::read_to_string(file).map_err(StorageError::from)?;
        let (section_engine, entry_engine) = self.config.rubrics.engines()?;
        let (engine, scope) = if whole_entry {
            (entry_engine, "entry")
        } else {
            (section_engine, "section")
        };
        let report = engine.validate(&text, &SectionContext::new(scope, None, None));
        let rendered = if format == "json" {
            to_json(&report)?
        } else {
            format_report_text(&report)
        };
        Ok(if report.passed {
            CommandOutput::ok(rendered)
        } else {
            CommandOutput::failed(rendered)
        })
    }

    fn handle_reset(&self, entry_id: &str, remove_output: bool) -> Result<CommandOutput, PipelineError> {
        CheckpointStore::new(&self.paths.checkpoints)?.delete(entry_id)?;
        let mut message = format!("Checkpoint for '{}' removed.", entry_id);
        if remove_output {
            let outputs = OutputStore::new(&self.paths.output)?;
            for path in [outputs.document_path(entry_id), outputs.report_path(entry_id)] {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StorageError::from(e).into()),
                }
            }
            message.push_str(" Output removed.");
        }
        Ok(CommandOutput::ok(message))
    }

    fn handle_runs(
        &self,
        limit: usize,
        prune: Option<usize>,
        events: Option<&str>,
        format: &str,
    ) -> Result<CommandOutput, PipelineError> {
        let ledger = RunLedger::open(&self.paths.ledger)?;
        if let Some(keep) = prune {
            let removed = ledger.prune(keep)?;
            ledger.flush()?;
            info!(removed, keep, "Pruned run ledger");
        }
        if let Some(run_id) = events {
            if ledger.get_run(run_id)?.is_none() {
                return Ok(CommandOutput::failed(format!("Unknown run '{}'", run_id)));
            }
            return Ok(CommandOutput::ok(format_events(&ledger.read_events(run_id)?, format)?));
        }
        let runs: Vec<_> = ledger.list_runs()?.into_iter().take(limit).collect();
        Ok(CommandOutput::ok(format_runs(&runs, format)?))
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, PipelineError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| PipelineError::Storage(StorageError::IoError(e)))
}
