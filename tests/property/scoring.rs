//! Property-based tests for rubric scoring

use proptest::prelude::*;
use quire::validation::{Rubric, SectionContext, ValidationEngine};

fn text_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Za-z]{1,10}|\\([a-z]{1,6} [0-9]{1,2}:[0-9]{1,2}\\)|#{1,2} [a-z]{1,8}|\n", 0..400)
        .prop_map(|words| words.join(" "))
}

/// Scores stay in range and every score maps to the highest band it reaches
#[test]
fn test_score_lands_in_exactly_one_band() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let rubric = Rubric::default_section();
    let engine = ValidationEngine::new(rubric.clone()).unwrap();
    let context = SectionContext::new("body", Some(150), Some(2000));

    runner
        .run(&text_strategy(), |text| {
            let report = engine.validate(&text, &context);
            prop_assert!((0.0..=100.0).contains(&report.overall_score));

            let matching: Vec<_> = rubric
                .tiers
                .iter()
                .enumerate()
                .filter(|(i, band)| {
                    report.overall_score >= band.min
                        && (*i == 0 || report.overall_score < rubric.tiers[i - 1].min)
                })
                .collect();
            prop_assert_eq!(matching.len(), 1);
            prop_assert_eq!(&matching[0].1.label, &report.tier);

            for score in report.criterion_scores.values() {
                prop_assert!((0.0..=100.0).contains(score));
            }
            if report.passed {
                prop_assert!(report.overall_score >= rubric.pass_threshold);
                prop_assert!(report.errors.is_empty());
            }
            Ok(())
        })
        .unwrap();
}

/// Scoring the same text twice gives the same report
#[test]
fn test_scoring_is_deterministic() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let engine = ValidationEngine::new(Rubric::default_section()).unwrap();
    let context = SectionContext::new("body", None, None);

    runner
        .run(&text_strategy(), |text| {
            prop_assert_eq!(
                engine.validate(&text, &context),
                engine.validate(&text, &context)
            );
            Ok(())
        })
        .unwrap();
}

/// Padding a short text towards the minimum never lowers the length score
#[test]
fn test_length_score_monotonic_below_minimum() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let engine = ValidationEngine::new(Rubric::default_section()).unwrap();
    let context = SectionContext::new("body", Some(200), None);

    runner
        .run(&(1usize..199, 1usize..50), |(base, extra)| {
            let shorter = vec!["word"; base].join(" ");
            let longer = vec!["word"; (base + extra).min(200)].join(" ");
            let a = engine.validate(&shorter, &context).criterion_scores["length"];
            let b = engine.validate(&longer, &context).criterion_scores["length"];
            prop_assert!(b >= a);
            Ok(())
        })
        .unwrap();
}
