//! Prompt construction
//!
//! Prompt wording is configuration, not code: section prompts, the blueprint
//! prompt and the correction prompt are templates with `{name}` placeholders.
//! Substitution is a single left-to-right pass, so placeholder-like text
//! inside generated content is never expanded a second time.

use crate::generation::job::{EntrySpec, SectionSpec};
use crate::validation::ValidationReport;

pub const DEFAULT_CORRECTION_TEMPLATE: &str = "\
{prompt}

A previous draft of this section did not meet the quality bar.

Previous draft:
{previous}

Problems found:
{issues}

Rewrite the section so that every problem above is fixed. Reply with the section text only.";

/// What a section prompt may refer to.
#[derive(Debug, Clone, Copy)]
pub struct SectionPromptContext<'a> {
    pub entry: &'a EntrySpec,
    pub section: &'a SectionSpec,
    pub blueprint: Option<&'a str>,
    /// Content of the previous completed section, if any.
    pub previous: Option<&'a str>,
}

/// Builds every prompt the pipeline sends.
///
/// Implementations must be deterministic: the same inputs produce the same
/// prompt, otherwise resumed runs miss the cache.
pub trait PromptBuilder: Send + Sync {
    fn blueprint_prompt(&self, template: &str, entry: &EntrySpec) -> String;

    fn section_prompt(&self, context: &SectionPromptContext<'_>) -> String;

    fn correction_prompt(&self, original: &str, previous: &str, report: &ValidationReport)
        -> String;
}

/// Placeholder-filling [`PromptBuilder`].
///
/// Section and blueprint templates understand `{topic}`, `{entry}`,
/// `{section}`, `{title}`, `{blueprint}` and `{previous}`; the correction
/// template understands `{prompt}`, `{previous}` and `{issues}`.
#[derive(Debug, Clone)]
pub struct TemplatePrompts {
    correction_template: String,
}

impl TemplatePrompts {
    pub fn new(correction_template: impl Into<String>) -> Self {
        Self {
            correction_template: correction_template.into(),
        }
    }
}

impl Default for TemplatePrompts {
    fn default() -> Self {
        Self::new(DEFAULT_CORRECTION_TEMPLATE)
    }
}

impl PromptBuilder for TemplatePrompts {
    fn blueprint_prompt(&self, template: &str, entry: &EntrySpec) -> String {
        fill_template(
            template,
            &[("topic", entry.topic.as_str()), ("entry", entry.id.as_str())],
        )
    }

    fn section_prompt(&self, context: &SectionPromptContext<'_>) -> String {
        fill_template(
            &context.section.prompt,
            &[
                ("topic", context.entry.topic.as_str()),
                ("entry", context.entry.id.as_str()),
                ("section", context.section.id.as_str()),
                ("title", context.section.title.as_str()),
                ("blueprint", context.blueprint.unwrap_or("")),
                ("previous", context.previous.unwrap_or("")),
            ],
        )
    }

    fn correction_prompt(
        &self,
        original: &str,
        previous: &str,
        report: &ValidationReport,
    ) -> String {
        let issues = report
            .issue_lines()
            .into_iter()
            .map(|line| format!("- {line}"))
            .collect::<Vec<_>>();
        let issues = if issues.is_empty() {
            format!(
                "- overall score {:.2} is below the pass threshold",
                report.overall_score
            )
        } else {
            issues.join("\n")
        };
        fill_template(
            &self.correction_template,
            &[("prompt", original), ("previous", previous), ("issues", &issues)],
        )
    }
}

/// Replace `{name}` placeholders in one pass. Unknown placeholders are kept as written.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationIssue;
    use std::collections::BTreeMap;

    fn section() -> SectionSpec {
        SectionSpec {
            id: "life".to_string(),
            title: "Life".to_string(),
            prompt: "Entry {entry}: write '{title}' on {topic}.\nOutline: {blueprint}".to_string(),
            min_words: None,
            max_words: None,
        }
    }

    fn report() -> ValidationReport {
        ValidationReport {
            criterion_scores: BTreeMap::new(),
            weights: BTreeMap::new(),
            overall_score: 60.0,
            tier: "C".to_string(),
            passed: false,
            word_count: 100,
            errors: vec![ValidationIssue {
                code: "criterion_below_floor".to_string(),
                criterion: Some("length".to_string()),
                message: "length scored 50.00, floor 60.00".to_string(),
            }],
            warnings: vec![],
        }
    }

    #[test]
    fn test_fill_template_single_pass() {
        let out = fill_template("{a} and {b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b} and x");
    }

    #[test]
    fn test_fill_template_keeps_unknown_and_unbalanced() {
        assert_eq!(fill_template("{nope} {a", &[("a", "1")]), "{nope} {a");
        assert_eq!(fill_template("{{a}}", &[("a", "1")]), "{1}");
    }

    #[test]
    fn test_section_prompt() {
        let entry = EntrySpec::new("basil", "Basil of Caesarea");
        let section = section();
        let prompt = TemplatePrompts::default().section_prompt(&SectionPromptContext {
            entry: &entry,
            section: &section,
            blueprint: Some("1. Youth"),
            previous: None,
        });
        assert_eq!(
            prompt,
            "Entry basil: write 'Life' on Basil of Caesarea.\nOutline: 1. Youth"
        );
    }

    #[test]
    fn test_correction_prompt_lists_issues() {
        let prompts = TemplatePrompts::new("{prompt}|{previous}|{issues}");
        let prompt = prompts.correction_prompt("orig", "draft", &report());
        assert_eq!(
            prompt,
            "orig|draft|- error [criterion_below_floor]: length scored 50.00, floor 60.00"
        );
    }

    #[test]
    fn test_correction_prompt_without_issues_mentions_score() {
        let mut report = report();
        report.errors.clear();
        let prompt = TemplatePrompts::new("{issues}").correction_prompt("p", "d", &report);
        assert!(prompt.contains("60.00"));
    }
}
