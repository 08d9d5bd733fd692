//! Property-based tests for fingerprint and record name determinism

use proptest::prelude::*;
use quire::fingerprint::{compute_fingerprint, record_name};
use quire::request::{GenerationRequest, SamplingParams};

fn request(entry: &str, section: &str, prompt: &str, temperature: f32) -> GenerationRequest {
    GenerationRequest {
        entry_id: entry.to_string(),
        section_id: section.to_string(),
        model: "scripted".to_string(),
        prompt: prompt.to_string(),
        sampling: SamplingParams {
            temperature,
            ..SamplingParams::default()
        },
        min_words: 0,
        max_words: None,
    }
}

/// Equal requests always fingerprint the same
#[test]
fn test_fingerprint_determinism_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(any::<String>(), any::<String>(), any::<String>(), 0.0f32..2.0),
            |(entry, section, prompt, temperature)| {
                let a = compute_fingerprint(&request(&entry, &section, &prompt, temperature));
                let b = compute_fingerprint(&request(&entry, &section, &prompt, temperature));
                prop_assert_eq!(a, b);
                prop_assert_eq!(Some(a), quire::fingerprint::Fingerprint::from_hex(&a.to_hex()));
                Ok(())
            },
        )
        .unwrap();
}

/// Moving characters between fields changes the fingerprint
#[test]
fn test_fingerprint_field_boundaries_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &("[a-z]{1,12}", "[a-z]{1,12}", "[a-z ]{0,40}"),
            |(left, right, prompt)| {
                let joined = format!("{left}{right}");
                let split = compute_fingerprint(&request(&left, &right, &prompt, 0.7));
                let shifted = compute_fingerprint(&request(&joined, "", &prompt, 0.7));
                prop_assert_ne!(split, shifted);
                Ok(())
            },
        )
        .unwrap();
}

/// Any change to the prompt or sampling changes the fingerprint
#[test]
fn test_fingerprint_sensitivity_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(any::<String>(), any::<String>(), 0.0f32..2.0, 0.0f32..2.0),
            |(prompt_a, prompt_b, temp_a, temp_b)| {
                let a = compute_fingerprint(&request("e", "s", &prompt_a, temp_a));
                let b = compute_fingerprint(&request("e", "s", &prompt_b, temp_b));
                if prompt_a == prompt_b && temp_a.to_bits() == temp_b.to_bits() {
                    prop_assert_eq!(a, b);
                } else {
                    prop_assert_ne!(a, b);
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Record names are stable and only use characters safe in any file name
#[test]
fn test_record_name_is_filesystem_safe() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<String>(), |entry_id| {
            let name = record_name(&entry_id);
            prop_assert_eq!(&name, &record_name(&entry_id));
            prop_assert!(!name.is_empty());
            prop_assert!(name.len() <= 48 + 1 + 16);
            prop_assert!(name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!name.starts_with('-'));
            Ok(())
        })
        .unwrap();
}

/// Ids that only differ in case or punctuation still get distinct names
#[test]
fn test_record_name_keeps_similar_ids_apart() {
    let pairs = [
        ("John 1", "john-1"),
        ("a/b", "a b"),
        ("Ünïcode", "unicode"),
        ("", "-"),
    ];
    for (a, b) in pairs {
        assert_ne!(record_name(a), record_name(b), "{a:?} vs {b:?}");
    }
}
