//! Done and Failed sections never change once checkpointed.

use super::test_utils::{section, words, Wiring};
use quire::backend::ScriptedBackend;
use quire::checkpoint::{CheckpointStore, EntryCheckpoint, EntryPhase, SectionStatus};
use quire::error::PipelineError;
use quire::generation::{EntrySpec, JobSpec};
use std::sync::Arc;
use tempfile::TempDir;

fn job() -> JobSpec {
    JobSpec {
        title_template: None,
        blueprint_prompt: None,
        sections: vec![
            section("first", "First", "first part of {topic}"),
            section("second", "Second", "second part of {topic}"),
        ],
        entries: vec![EntrySpec::new("fig", "Fig")],
    }
}

#[tokio::test]
async fn test_terminal_sections_survive_reruns_and_reloads() {
    let dir = TempDir::new().unwrap();
    let wiring = Wiring::new(job());
    let entry = wiring.job.entries[0].clone();
    let backend = Arc::new(
        ScriptedBackend::new("scripted")
            .with_response("first part", &words("leaf", 12))
            .with_response("second part", "nope"),
    );
    let orchestrator = wiring.build(dir.path(), backend);

    assert!(matches!(
        orchestrator.run(&entry).await,
        Err(PipelineError::SectionFailed { .. })
    ));
    let saved = orchestrator.checkpoints().load("fig").unwrap();
    assert_eq!(saved.phase, EntryPhase::Failed);
    assert_eq!(saved.sections[0].status, SectionStatus::Done);
    assert_eq!(saved.sections[1].status, SectionStatus::Failed);

    // A later run with a backend that would now succeed changes nothing.
    let fixed = Arc::new(ScriptedBackend::new("scripted").with_response("part", &words("new", 20)));
    let rerun = wiring.build(dir.path(), fixed.clone());
    assert!(rerun.run(&entry).await.is_err());
    assert_eq!(fixed.calls(), 0);

    let store = CheckpointStore::new(dir.path().join("checkpoints")).unwrap();
    let mut reloaded = store.load("fig").unwrap();
    assert_eq!(reloaded.sections, saved.sections);

    // Terminal records refuse every transition, so saves cannot regress them.
    for next in [
        SectionStatus::Pending,
        SectionStatus::Generating,
        SectionStatus::Validating,
        SectionStatus::Correcting,
    ] {
        assert!(reloaded.sections[0].clone().advance(next).is_err());
        assert!(reloaded.sections[1].clone().advance(next).is_err());
    }

    // Load then save of identical content is invisible to later loads.
    store.save(&reloaded).unwrap();
    store.save(&reloaded).unwrap();
    reloaded = store.load("fig").unwrap();
    assert_eq!(reloaded.sections, saved.sections);
    assert_eq!(reloaded.phase, EntryPhase::Failed);
}

#[test]
fn test_corrupt_primary_falls_back_to_backup() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path()).unwrap();

    let mut checkpoint = EntryCheckpoint::new("fig", ["first", "second"], false);
    store.save(&checkpoint).unwrap();
    checkpoint.sections[0].advance(SectionStatus::Generating).unwrap();
    store.save(&checkpoint).unwrap();

    let primary = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .unwrap();
    std::fs::write(&primary, b"{ truncated").unwrap();

    let recovered = store.load("fig").unwrap();
    assert_eq!(recovered.sections[0].status, SectionStatus::Pending);
}
