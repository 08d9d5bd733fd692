//! Rubric configuration: criteria, weights, floors, pass threshold and tier bands.
//!
//! Rubrics are plain data loaded from configuration. [`Rubric::check`] enforces
//! the structural rules the engine relies on; the engine refuses unchecked input.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// One scoring criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub weight: f64,
    /// Sub-scores below this value produce an error.
    #[serde(default)]
    pub floor: f64,
    /// Sub-scores within `floor + warn_margin` produce a warning.
    #[serde(default)]
    pub warn_margin: f64,
    pub measure: Measure,
}

/// Textual measurement behind a criterion. Each yields a 0-100 sub-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measure {
    /// Word count against the section's min/max word bounds.
    Length,
    /// Keyword token hits per thousand words against a target rate.
    KeywordDensity {
        keywords: Vec<String>,
        per_thousand: f64,
    },
    /// Distinct/total word ratio against a target ratio.
    LexicalDiversity { target_ratio: f64 },
    /// Regex matches (citations, verse references) against a target count.
    ReferenceCount { pattern: String, target: u32 },
    /// Fraction of required regex markers (headings, lists) present.
    StructuralMarkers { markers: Vec<String> },
    /// Case-insensitive phrase occurrences against a target count.
    PerspectiveMarkers { phrases: Vec<String>, target: u32 },
}

/// A named score band. Bands are listed highest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBand {
    pub label: String,
    pub min: f64,
    pub max: f64,
}

impl TierBand {
    pub fn new(label: &str, min: f64, max: f64) -> Self {
        Self {
            label: label.to_string(),
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub pass_threshold: f64,
    pub criteria: Vec<Criterion>,
    pub tiers: Vec<TierBand>,
    /// Fallback word bounds when the section context carries none.
    #[serde(default)]
    pub min_words: Option<u32>,
    #[serde(default)]
    pub max_words: Option<u32>,
}

impl Rubric {
    /// Validate weights and tier bands.
    ///
    /// Bands must start at 100, end at 0, and each band's `max` must lie in
    /// `(0, 1]` below the previous band's `min`. A score belongs to the first
    /// band whose `min` it reaches, so integer bands such as 95-100 / 80-94
    /// leave no gap for real-valued scores.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.criteria.is_empty() {
            return Err(invalid("rubric has no criteria"));
        }
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(invalid(format!(
                "pass_threshold {} outside [0, 100]",
                self.pass_threshold
            )));
        }

        let mut names = std::collections::HashSet::new();
        let mut total = 0.0;
        for criterion in &self.criteria {
            if !names.insert(criterion.name.as_str()) {
                return Err(invalid(format!("duplicate criterion '{}'", criterion.name)));
            }
            if !(criterion.weight.is_finite() && criterion.weight >= 0.0) {
                return Err(invalid(format!(
                    "criterion '{}' has invalid weight {}",
                    criterion.name, criterion.weight
                )));
            }
            let floor_ok = (0.0..=100.0).contains(&criterion.floor);
            let margin_ok = criterion.warn_margin.is_finite() && criterion.warn_margin >= 0.0;
            if !(floor_ok && margin_ok) {
                return Err(invalid(format!(
                    "criterion '{}' has invalid floor/warn_margin",
                    criterion.name
                )));
            }
            total += criterion.weight;
        }
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(invalid(format!("weights sum to {total}, expected 1.0")));
        }

        self.check_tiers()
    }

    fn check_tiers(&self) -> Result<(), PipelineError> {
        let (first, last) = match (self.tiers.first(), self.tiers.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(invalid("rubric has no tier bands")),
        };
        if first.max != 100.0 {
            return Err(invalid(format!(
                "highest band '{}' must end at 100",
                first.label
            )));
        }
        if last.min != 0.0 {
            return Err(invalid(format!("lowest band '{}' must start at 0", last.label)));
        }
        for band in &self.tiers {
            if !(band.min.is_finite() && band.max.is_finite()) {
                return Err(invalid(format!("band '{}' has a non-finite bound", band.label)));
            }
            if band.min > band.max {
                return Err(invalid(format!("band '{}' has min > max", band.label)));
            }
        }
        for pair in self.tiers.windows(2) {
            let (upper, lower) = (&pair[0], &pair[1]);
            let step = upper.min - lower.max;
            if !(step > 0.0) {
                return Err(invalid(format!(
                    "bands '{}' and '{}' overlap",
                    upper.label, lower.label
                )));
            }
            if step > 1.0 {
                return Err(invalid(format!(
                    "gap between bands '{}' and '{}'",
                    upper.label, lower.label
                )));
            }
        }
        Ok(())
    }

    /// Map a score to its band label. Assumes a checked rubric.
    pub fn tier_for(&self, score: f64) -> &str {
        self.tiers
            .iter()
            .find(|band| score >= band.min)
            .or(self.tiers.last())
            .map(|band| band.label.as_str())
            .unwrap_or("")
    }

    /// Out-of-the-box section rubric: length, vocabulary range and some structure.
    pub fn default_section() -> Self {
        Self {
            pass_threshold: 70.0,
            criteria: vec![
                Criterion {
                    name: "length".to_string(),
                    weight: 0.5,
                    floor: 40.0,
                    warn_margin: 10.0,
                    measure: Measure::Length,
                },
                Criterion {
                    name: "lexical_diversity".to_string(),
                    weight: 0.3,
                    floor: 0.0,
                    warn_margin: 0.0,
                    measure: Measure::LexicalDiversity { target_ratio: 0.4 },
                },
                Criterion {
                    name: "references".to_string(),
                    weight: 0.2,
                    floor: 0.0,
                    warn_margin: 0.0,
                    measure: Measure::ReferenceCount {
                        pattern: r"\([^()]*\d[^()]*\)".to_string(),
                        target: 2,
                    },
                },
            ],
            tiers: default_tiers(),
            min_words: Some(150),
            max_words: None,
        }
    }

    /// Out-of-the-box whole-entry rubric: overall length and section headings.
    pub fn default_entry() -> Self {
        Self {
            pass_threshold: 60.0,
            criteria: vec![
                Criterion {
                    name: "length".to_string(),
                    weight: 0.6,
                    floor: 0.0,
                    warn_margin: 0.0,
                    measure: Measure::Length,
                },
                Criterion {
                    name: "structure".to_string(),
                    weight: 0.4,
                    floor: 50.0,
                    warn_margin: 0.0,
                    measure: Measure::StructuralMarkers {
                        markers: vec![r"(?m)^# ".to_string(), r"(?m)^## ".to_string()],
                    },
                },
            ],
            tiers: default_tiers(),
            min_words: Some(300),
            max_words: None,
        }
    }
}

fn default_tiers() -> Vec<TierBand> {
    vec![
        TierBand::new("A", 90.0, 100.0),
        TierBand::new("B", 75.0, 89.0),
        TierBand::new("C", 60.0, 74.0),
        TierBand::new("D", 0.0, 59.0),
    ]
}

fn invalid(msg: impl Into<String>) -> PipelineError {
    PipelineError::InvalidRubric(msg.into())
}
