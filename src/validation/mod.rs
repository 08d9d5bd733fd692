//! Validation Engine
//!
//! Pure scoring of generated text against a [`Rubric`]: every criterion yields
//! a 0-100 sub-score, sub-scores are combined by the rubric's weights, and the
//! overall score is mapped to a quality tier. Floors produce itemized errors,
//! near-floor scores produce warnings. Same text and rubric, same report.

mod measure;
pub mod rubric;

pub use rubric::{Criterion, Measure, Rubric, TierBand};

use crate::error::PipelineError;
use measure::{CompiledMeasure, TextStats, WordBounds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CODE_EMPTY_TEXT: &str = "empty_text";
pub const CODE_BELOW_FLOOR: &str = "criterion_below_floor";
pub const CODE_NEAR_FLOOR: &str = "criterion_near_floor";

/// Section-level facts the measures need beyond the text itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionContext {
    pub section_id: String,
    pub min_words: Option<u32>,
    pub max_words: Option<u32>,
}

impl SectionContext {
    pub fn new(section_id: impl Into<String>, min_words: Option<u32>, max_words: Option<u32>) -> Self {
        Self {
            section_id: section_id.into(),
            min_words,
            max_words,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criterion: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub criterion_scores: BTreeMap<String, f64>,
    pub weights: BTreeMap<String, f64>,
    pub overall_score: f64,
    pub tier: String,
    pub passed: bool,
    pub word_count: usize,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Outcome of a validation pass, so callers branch on a value rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(ValidationReport),
    Rejected(ValidationReport),
}

impl ValidationReport {
    pub fn verdict(self) -> Verdict {
        if self.passed {
            Verdict::Accepted(self)
        } else {
            Verdict::Rejected(self)
        }
    }

    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            overall_score: self.overall_score,
            tier: self.tier.clone(),
            passed: self.passed,
            error_count: self.errors.len(),
            warning_count: self.warnings.len(),
        }
    }

    /// One line per issue, errors first. Used to build correction prompts.
    pub fn issue_lines(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|i| format!("error [{}]: {}", i.code, i.message))
            .chain(
                self.warnings
                    .iter()
                    .map(|i| format!("warning [{}]: {}", i.code, i.message)),
            )
            .collect()
    }
}

/// Compact form of a report stored alongside cached artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub overall_score: f64,
    pub tier: String,
    pub passed: bool,
    pub error_count: usize,
    pub warning_count: usize,
}

/// A checked rubric with its measures compiled. Cheap to share by reference.
pub struct ValidationEngine {
    rubric: Rubric,
    measures: Vec<CompiledMeasure>,
}

impl ValidationEngine {
    pub fn new(rubric: Rubric) -> Result<Self, PipelineError> {
        rubric.check()?;
        let measures = rubric
            .criteria
            .iter()
            .map(|c| CompiledMeasure::compile(&c.name, &c.measure))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rubric, measures })
    }

    pub fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    pub fn validate(&self, text: &str, context: &SectionContext) -> ValidationReport {
        let stats = TextStats::new(text);
        let bounds = WordBounds {
            min: context.min_words.or(self.rubric.min_words),
            max: context.max_words.or(self.rubric.max_words),
        };

        let mut criterion_scores = BTreeMap::new();
        let mut weights = BTreeMap::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut overall = 0.0;

        if stats.word_count() == 0 {
            errors.push(ValidationIssue {
                code: CODE_EMPTY_TEXT.to_string(),
                criterion: None,
                message: format!("section '{}' produced no text", context.section_id),
            });
        }

        for (criterion, measure) in self.rubric.criteria.iter().zip(&self.measures) {
            let score = round2(measure.score(&stats, bounds).clamp(0.0, 100.0));
            overall += criterion.weight * score;

            if score < criterion.floor {
                errors.push(ValidationIssue {
                    code: CODE_BELOW_FLOOR.to_string(),
                    criterion: Some(criterion.name.clone()),
                    message: format!(
                        "{} scored {:.2}, below the floor of {:.2}",
                        criterion.name, score, criterion.floor
                    ),
                });
            } else if criterion.warn_margin > 0.0 && score < criterion.floor + criterion.warn_margin
            {
                warnings.push(ValidationIssue {
                    code: CODE_NEAR_FLOOR.to_string(),
                    criterion: Some(criterion.name.clone()),
                    message: format!(
                        "{} scored {:.2}, within {:.2} of the floor",
                        criterion.name, score, criterion.warn_margin
                    ),
                });
            }

            criterion_scores.insert(criterion.name.clone(), score);
            weights.insert(criterion.name.clone(), criterion.weight);
        }

        let overall_score = round2(overall.clamp(0.0, 100.0));
        let passed = overall_score >= self.rubric.pass_threshold && errors.is_empty();

        ValidationReport {
            criterion_scores,
            weights,
            overall_score,
            tier: self.rubric.tier_for(overall_score).to_string(),
            passed,
            word_count: stats.word_count(),
            errors,
            warnings,
        }
    }
}

/// Check and compile `rubric`, then score `text` once.
pub fn validate(
    text: &str,
    context: &SectionContext,
    rubric: &Rubric,
) -> Result<ValidationReport, PipelineError> {
    Ok(ValidationEngine::new(rubric.clone())?.validate(text, context))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
