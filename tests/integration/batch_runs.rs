//! Batch runs: failures do not stop the batch, finished entries are skipped
//! on the next run, and the ledger records both runs.

use super::test_utils::{section, words, Wiring};
use quire::backend::ScriptedBackend;
use quire::generation::{BatchRunStats, BatchScheduler, EntrySpec, JobSpec};
use quire::progress::{RunLedger, RunStatus};
use std::sync::Arc;
use tempfile::TempDir;

fn job() -> JobSpec {
    JobSpec {
        title_template: None,
        blueprint_prompt: None,
        sections: vec![section("body", "Body", "write about {topic}")],
        entries: vec![
            EntrySpec::new("sage", "Sage"),
            EntrySpec::new("rue", "Rue"),
            EntrySpec::new("dill", "Dill"),
        ],
    }
}

#[tokio::test]
async fn test_batch_continues_past_failures_and_skips_on_rerun() {
    let dir = TempDir::new().unwrap();
    let wiring = Wiring::new(job());
    let stats_path = dir.path().join("batch_stats.json");
    let ledger_path = dir.path().join("ledger");

    // "Rue" always comes back too short.
    let backend = || {
        Arc::new(ScriptedBackend::from_fn("scripted", |prompt| {
            if prompt.contains("Rue") {
                Ok("too short".to_string())
            } else {
                Ok(words("herb", 15))
            }
        }))
    };

    let first = {
        let scheduler = BatchScheduler::new(wiring.build(dir.path(), backend()), &stats_path, 1)
            .with_ledger(RunLedger::open(&ledger_path).unwrap());
        scheduler.run(&wiring.job.entries).await.unwrap()
    };
    assert_eq!(first.total, 3);
    assert_eq!(first.completed, 2);
    assert_eq!(first.failed, 1);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.per_entry_errors.len(), 1);
    assert_eq!(first.per_entry_errors[0].entry_id, "rue");
    assert!(first.ended_at.is_some());

    let persisted = BatchRunStats::load(&stats_path).unwrap().unwrap();
    assert_eq!(persisted.completed, 2);
    assert_eq!(persisted.run_id, first.run_id);

    let second_backend = backend();
    let second = {
        let scheduler = BatchScheduler::new(
            wiring.build(dir.path(), second_backend.clone()),
            &stats_path,
            10,
        )
        .with_ledger(RunLedger::open(&ledger_path).unwrap());
        scheduler.run(&wiring.job.entries).await.unwrap()
    };
    assert_eq!(second.skipped, 2);
    assert_eq!(second.completed, 0);
    // Rue's checkpoint is Failed, so it fails again without a backend call.
    assert_eq!(second.failed, 1);
    assert_eq!(second_backend.calls(), 0);

    let ledger = RunLedger::open(&ledger_path).unwrap();
    let runs = ledger.list_runs().unwrap();
    assert_eq!(runs.len(), 2);
    for run in &runs {
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.error.as_deref(), Some("1 entries failed"));
    }

    let first_id = first.run_id.unwrap();
    let events = ledger.read_events(&first_id).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        vec!["run_started", "entry_completed", "entry_failed", "entry_completed", "run_ended"]
    );
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(events[2].entry_id.as_deref(), Some("rue"));
}

#[tokio::test]
async fn test_batch_without_ledger_still_writes_stats() {
    let dir = TempDir::new().unwrap();
    let wiring = Wiring::new(job());
    let stats_path = dir.path().join("stats").join("batch.json");
    let backend = Arc::new(ScriptedBackend::from_fn("scripted", |_| Ok(words("herb", 15))));

    let scheduler = BatchScheduler::new(wiring.build(dir.path(), backend), &stats_path, 0);
    let stats = scheduler.run(&wiring.job.entries[..1]).await.unwrap();

    assert_eq!(stats.completed, 1);
    assert!(stats.run_id.is_none());
    assert!(BatchRunStats::load(&stats_path).unwrap().is_some());
    assert!(scheduler.orchestrator().outputs().exists("sage"));
}
