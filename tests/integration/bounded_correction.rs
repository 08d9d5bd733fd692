//! A section that never passes fails after exactly the configured attempts.

use super::test_utils::{section, Wiring};
use quire::backend::ScriptedBackend;
use quire::error::{BackendError, PipelineError};
use quire::generation::{EntrySpec, JobSpec};
use std::sync::Arc;
use tempfile::TempDir;

fn job() -> JobSpec {
    JobSpec {
        title_template: None,
        blueprint_prompt: None,
        sections: vec![section("only", "Only", "write about {topic}")],
        entries: vec![EntrySpec::new("thyme", "Thyme")],
    }
}

#[tokio::test]
async fn test_never_passing_section_uses_exactly_max_attempts() {
    for max_attempts in [1u32, 2, 4] {
        let dir = TempDir::new().unwrap();
        let mut wiring = Wiring::new(job());
        wiring.settings.max_attempts = max_attempts;
        let backend = Arc::new(ScriptedBackend::from_fn("scripted", |prompt| {
            Ok(format!("short {}", prompt.len()))
        }));
        let orchestrator = wiring.build(dir.path(), backend);

        let err = orchestrator
            .run(&wiring.job.entries[0])
            .await
            .unwrap_err();
        match err {
            PipelineError::SectionFailed { attempts, .. } => assert_eq!(attempts, max_attempts),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!orchestrator.outputs().exists("thyme"));
    }
}

#[tokio::test]
async fn test_backend_errors_share_the_same_budget() {
    let dir = TempDir::new().unwrap();
    let wiring = Wiring::new(job());
    let backend = Arc::new(ScriptedBackend::from_fn("scripted", |_| {
        Err(BackendError::Rejected("model not loaded".to_string()))
    }));
    let orchestrator = wiring.build(dir.path(), backend.clone());

    let err = orchestrator.run(&wiring.job.entries[0]).await.unwrap_err();
    match err {
        PipelineError::SectionFailed { attempts, reason, .. } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("model not loaded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.calls(), 3);
}
