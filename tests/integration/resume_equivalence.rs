//! A run killed at any backend call and then resumed writes the same document
//! as a run that was never interrupted.

use super::test_utils::{three_section_job, Wiring};
use async_trait::async_trait;
use quire::backend::{Backend, ScriptedBackend};
use quire::error::BackendError;
use quire::request::SamplingParams;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Deterministic text for a prompt. First drafts of "growth" are too short,
/// so that section always goes through one correction.
fn respond(prompt: &str) -> Result<String, BackendError> {
    if prompt.starts_with("growth of") && !prompt.contains("Previous draft") {
        return Ok("too short".to_string());
    }
    let seed = prompt.len();
    Ok((0..14)
        .map(|i| format!("w{}", (seed + i * 31) % 101))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Answers like [`respond`] but never returns from call number `hang_at`.
struct HangingBackend {
    hang_at: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Backend for HangingBackend {
    async fn generate(&self, prompt: &str, _sampling: &SamplingParams) -> Result<String, BackendError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.hang_at {
            std::future::pending::<()>().await;
        }
        respond(prompt)
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_kill_at_every_call_is_byte_identical() {
    let wiring = Wiring::new(three_section_job());
    let entry = wiring.job.entries[0].clone();

    let reference_dir = TempDir::new().unwrap();
    let reference_backend = Arc::new(ScriptedBackend::from_fn("scripted", respond));
    let reference = wiring
        .build(reference_dir.path(), reference_backend.clone())
        .run(&entry)
        .await
        .unwrap();
    let total_calls = reference_backend.calls();
    assert_eq!(total_calls, 4, "three sections plus one correction");

    for hang_at in 0..total_calls {
        let dir = TempDir::new().unwrap();
        let hanging = Arc::new(HangingBackend {
            hang_at,
            calls: AtomicUsize::new(0),
        });
        let interrupted = wiring.build(dir.path(), hanging);
        let killed = tokio::time::timeout(Duration::from_secs(1), interrupted.run(&entry)).await;
        assert!(killed.is_err(), "run should be cut off at call {hang_at}");
        drop(interrupted);

        let resumed = wiring
            .build(dir.path(), Arc::new(ScriptedBackend::from_fn("scripted", respond)))
            .run(&entry)
            .await
            .unwrap();
        assert_eq!(
            resumed.document, reference.document,
            "document differs after kill at call {hang_at}"
        );
        let on_disk = std::fs::read_to_string(&resumed.output_path).unwrap();
        assert_eq!(on_disk, reference.document);
    }
}
