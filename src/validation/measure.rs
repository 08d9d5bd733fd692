//! Textual measurements behind rubric criteria.

use crate::error::PipelineError;
use crate::validation::rubric::Measure;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

/// Pre-tokenized view of a text shared by every measure.
pub(crate) struct TextStats {
    normalized: String,
    lowered: String,
    words: Vec<String>,
}

impl TextStats {
    pub(crate) fn new(text: &str) -> Self {
        let normalized: String = text.nfc().collect();
        let lowered = normalized.to_lowercase();
        let words = lowered
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            normalized,
            lowered,
            words,
        }
    }

    pub(crate) fn word_count(&self) -> usize {
        self.words.len()
    }
}

/// Word bounds applying to the text being measured.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WordBounds {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

/// A measure with its regexes compiled.
pub(crate) enum CompiledMeasure {
    Length,
    KeywordDensity {
        keywords: HashSet<String>,
        per_thousand: f64,
    },
    LexicalDiversity {
        target_ratio: f64,
    },
    ReferenceCount {
        pattern: Regex,
        target: u32,
    },
    StructuralMarkers {
        markers: Vec<Regex>,
    },
    PerspectiveMarkers {
        phrases: Vec<String>,
        target: u32,
    },
}

impl CompiledMeasure {
    pub(crate) fn compile(criterion: &str, measure: &Measure) -> Result<Self, PipelineError> {
        let compile_regex = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                PipelineError::InvalidRubric(format!(
                    "criterion '{criterion}' has invalid pattern '{pattern}': {e}"
                ))
            })
        };

        Ok(match measure {
            Measure::Length => CompiledMeasure::Length,
            Measure::KeywordDensity {
                keywords,
                per_thousand,
            } => {
                if !(per_thousand.is_finite() && *per_thousand > 0.0) {
                    return Err(PipelineError::InvalidRubric(format!(
                        "criterion '{criterion}' needs a positive per_thousand target"
                    )));
                }
                CompiledMeasure::KeywordDensity {
                    keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
                    per_thousand: *per_thousand,
                }
            }
            Measure::LexicalDiversity { target_ratio } => {
                if !(target_ratio.is_finite() && *target_ratio > 0.0) {
                    return Err(PipelineError::InvalidRubric(format!(
                        "criterion '{criterion}' needs a positive target_ratio"
                    )));
                }
                CompiledMeasure::LexicalDiversity {
                    target_ratio: *target_ratio,
                }
            }
            Measure::ReferenceCount { pattern, target } => CompiledMeasure::ReferenceCount {
                pattern: compile_regex(pattern)?,
                target: *target,
            },
            Measure::StructuralMarkers { markers } => CompiledMeasure::StructuralMarkers {
                markers: markers
                    .iter()
                    .map(|m| compile_regex(m))
                    .collect::<Result<_, _>>()?,
            },
            Measure::PerspectiveMarkers { phrases, target } => {
                CompiledMeasure::PerspectiveMarkers {
                    phrases: phrases.iter().map(|p| p.to_lowercase()).collect(),
                    target: *target,
                }
            }
        })
    }

    /// Raw 0-100 sub-score, before rounding.
    pub(crate) fn score(&self, stats: &TextStats, bounds: WordBounds) -> f64 {
        let words = stats.word_count() as f64;
        match self {
            CompiledMeasure::Length => length_score(stats.word_count(), bounds),
            CompiledMeasure::KeywordDensity {
                keywords,
                per_thousand,
            } => {
                if words == 0.0 {
                    return 0.0;
                }
                let hits = stats
                    .words
                    .iter()
                    .filter(|w| keywords.contains(w.as_str()))
                    .count() as f64;
                ratio_score(hits / words * 1000.0, *per_thousand)
            }
            CompiledMeasure::LexicalDiversity { target_ratio } => {
                if words == 0.0 {
                    return 0.0;
                }
                let distinct = stats.words.iter().collect::<HashSet<_>>().len() as f64;
                ratio_score(distinct / words, *target_ratio)
            }
            CompiledMeasure::ReferenceCount { pattern, target } => {
                let found = pattern.find_iter(&stats.normalized).count() as f64;
                ratio_score(found, f64::from(*target))
            }
            CompiledMeasure::StructuralMarkers { markers } => {
                if markers.is_empty() {
                    return 100.0;
                }
                let present = markers
                    .iter()
                    .filter(|m| m.is_match(&stats.normalized))
                    .count() as f64;
                present / markers.len() as f64 * 100.0
            }
            CompiledMeasure::PerspectiveMarkers { phrases, target } => {
                let found: usize = phrases
                    .iter()
                    .filter(|p| !p.is_empty())
                    .map(|p| stats.lowered.matches(p.as_str()).count())
                    .sum();
                ratio_score(found as f64, f64::from(*target))
            }
        }
    }
}

fn length_score(words: usize, bounds: WordBounds) -> f64 {
    let words = words as f64;
    if let Some(min) = bounds.min.filter(|m| *m > 0) {
        if words < f64::from(min) {
            return words / f64::from(min) * 100.0;
        }
    }
    if let Some(max) = bounds.max.filter(|m| *m > 0) {
        if words > f64::from(max) {
            return f64::from(max) / words * 100.0;
        }
    }
    if words == 0.0 {
        0.0
    } else {
        100.0
    }
}

/// `observed / target` as a capped percentage; a zero target is always met.
fn ratio_score(observed: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 100.0;
    }
    (observed / target * 100.0).min(100.0)
}
