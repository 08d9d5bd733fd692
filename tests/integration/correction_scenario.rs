//! One rejected draft, one correction, then acceptance.

use quire::backend::{BackendCaller, RetryPolicy, ScriptedBackend};
use quire::cache::{ArtifactCache, CacheConfig, Origin};
use quire::checkpoint::{SectionRecord, SectionStatus};
use quire::generation::{SectionRunner, StepOutcome, TemplatePrompts};
use quire::request::{GenerationRequest, SamplingParams};
use quire::validation::{Criterion, Measure, Rubric, ValidationEngine};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::test_utils::bands;

/// Half length, half density of the word "logos" (one per word is full marks).
fn scenario_rubric() -> Rubric {
    Rubric {
        pass_threshold: 80.0,
        criteria: vec![
            Criterion {
                name: "length".to_string(),
                weight: 0.5,
                floor: 0.0,
                warn_margin: 0.0,
                measure: Measure::Length,
            },
            Criterion {
                name: "focus".to_string(),
                weight: 0.5,
                floor: 0.0,
                warn_margin: 0.0,
                measure: Measure::KeywordDensity {
                    keywords: vec!["logos".to_string()],
                    per_thousand: 1000.0,
                },
            },
        ],
        tiers: bands(),
        min_words: None,
        max_words: None,
    }
}

fn text(keyword_hits: usize, filler: usize) -> String {
    let mut words = vec!["logos"; keyword_hits];
    words.extend(std::iter::repeat("filler").take(filler));
    words.join(" ")
}

#[tokio::test]
async fn test_rejected_draft_is_corrected_then_accepted() {
    let dir = TempDir::new().unwrap();
    let cache = ArtifactCache::open(dir.path(), &CacheConfig::default()).unwrap();
    // 100 words, 70 on topic: length 50, focus 70, overall 60.
    // 180 words, 171 on topic: length 90, focus 95, overall 92.5.
    let backend = Arc::new(
        ScriptedBackend::new("scripted")
            .with_response("Previous draft", &text(171, 9))
            .with_response("the Word", &text(70, 30)),
    );
    let caller = BackendCaller::new(backend.clone(), Duration::from_secs(30), RetryPolicy::none());
    let engine = ValidationEngine::new(scenario_rubric()).unwrap();
    let prompts = TemplatePrompts::default();
    let runner = SectionRunner::new(&cache, &caller, &engine, &prompts, 3);

    let request = GenerationRequest {
        entry_id: "john-1".to_string(),
        section_id: "prologue".to_string(),
        model: "scripted".to_string(),
        prompt: "write about the Word".to_string(),
        sampling: SamplingParams::default(),
        min_words: 200,
        max_words: None,
    };
    let mut record = SectionRecord::new("prologue");
    let mut outcomes = Vec::new();
    runner
        .run(&mut record, &request, |_, outcome| {
            outcomes.push(outcome.clone());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 5);
    assert_eq!(outcomes[0], StepOutcome::Started);
    assert!(matches!(
        outcomes[1],
        StepOutcome::Generated { origin: Origin::Computed, .. }
    ));
    assert_eq!(
        outcomes[2],
        StepOutcome::Rejected {
            overall_score: 60.0,
            tier: "C".to_string()
        }
    );
    assert!(matches!(outcomes[3], StepOutcome::Generated { .. }));
    assert_eq!(
        outcomes[4],
        StepOutcome::Accepted {
            overall_score: 92.5,
            tier: "B".to_string()
        }
    );

    assert_eq!(record.status, SectionStatus::Done);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.content.as_deref(), Some(text(171, 9).as_str()));
    assert_eq!(backend.calls(), 2);

    let prompts = backend.prompts();
    assert!(prompts[1].contains("write about the Word"));
    assert!(prompts[1].contains(&text(70, 30)));
}
