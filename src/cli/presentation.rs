//! CLI presentation: text and json formatters per command.

use crate::cache::DiskUsage;
use crate::error::{PipelineError, StorageError};
use crate::generation::{BatchRunStats, FinishedEntry};
use crate::progress::{RunEvent, RunRecord};
use crate::validation::ValidationReport;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn pass_label(passed: bool) -> String {
    if passed {
        format!("{}", "passed".green())
    } else {
        format!("{}", "rejected".red())
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        PipelineError::Storage(StorageError::Serialization(format!(
            "Failed to render JSON: {}",
            e
        )))
    })
}

/// Criterion table plus overall score, tier and issues.
pub fn format_report_text(report: &ValidationReport) -> String {
    let mut out = String::new();
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Criterion", "Score", "Weight"]);
    for (name, score) in &report.criterion_scores {
        let weight = report
            .weights
            .get(name)
            .map(|w| format!("{:.2}", w))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![name.clone(), format!("{:.2}", score), weight]);
    }
    out.push_str(&format!("{}\n\n", table));
    out.push_str(&format!(
        "  Overall: {:.2}  Tier: {}  Words: {}  {}\n",
        report.overall_score,
        report.tier,
        report.word_count,
        pass_label(report.passed)
    ));
    for issue in &report.errors {
        out.push_str(&format!("  {} [{}] {}\n", "error".red(), issue.code, issue.message));
    }
    for issue in &report.warnings {
        out.push_str(&format!(
            "  {} [{}] {}\n",
            "warning".yellow(),
            issue.code,
            issue.message
        ));
    }
    out
}

#[derive(Serialize)]
struct FinishedEntryJson<'a> {
    entry_id: &'a str,
    title: &'a str,
    output_path: String,
    attempts: u32,
    report: &'a ValidationReport,
}

pub fn format_finished_entry(entry: &FinishedEntry, format: &str) -> Result<String, PipelineError> {
    if format == "json" {
        return to_json(&FinishedEntryJson {
            entry_id: &entry.entry_id,
            title: &entry.title,
            output_path: entry.output_path.display().to_string(),
            attempts: entry.attempts,
            report: &entry.report,
        });
    }
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading(&entry.title)));
    out.push_str(&format!("  Entry: {}\n", entry.entry_id));
    out.push_str(&format!("  Written: {}\n", entry.output_path.display()));
    out.push_str(&format!("  Generation attempts: {}\n\n", entry.attempts));
    out.push_str(&format_report_text(&entry.report));
    Ok(out)
}

pub fn format_batch_stats(stats: &BatchRunStats, format: &str) -> Result<String, PipelineError> {
    if format == "json" {
        return to_json(stats);
    }
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Batch")));
    if let Some(run_id) = &stats.run_id {
        out.push_str(&format!("  Run: {}\n", run_id));
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Total", "Completed", "Failed", "Skipped"]);
    table.add_row(vec![
        stats.total.to_string(),
        stats.completed.to_string(),
        stats.failed.to_string(),
        stats.skipped.to_string(),
    ]);
    out.push_str(&format!("{}\n", table));
    if !stats.per_entry_errors.is_empty() {
        out.push_str(&format!("\n{}\n\n", format_section_heading("Failures")));
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Entry", "Error"]);
        for failure in &stats.per_entry_errors {
            table.add_row(vec![failure.entry_id.clone(), failure.error.clone()]);
        }
        out.push_str(&format!("{}\n", table));
    }
    Ok(out)
}

/// Everything `quire stats` reports.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStats {
    pub disk: DiskUsage,
    pub checkpoints: Vec<String>,
    pub finished_documents: usize,
    pub last_batch: Option<BatchRunStats>,
}

pub fn format_workspace_stats(stats: &WorkspaceStats, format: &str) -> Result<String, PipelineError> {
    if format == "json" {
        return to_json(stats);
    }
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Cache")));
    out.push_str(&format!(
        "  Cold records: {} ({} bytes)\n\n",
        stats.disk.records, stats.disk.bytes
    ));
    out.push_str(&format!("{}\n\n", format_section_heading("Entries")));
    out.push_str(&format!("  Finished documents: {}\n", stats.finished_documents));
    out.push_str(&format!("  In progress: {}\n", stats.checkpoints.len()));
    for entry_id in &stats.checkpoints {
        out.push_str(&format!("    - {}\n", entry_id));
    }
    if let Some(batch) = &stats.last_batch {
        out.push_str(&format!(
            "\n{}\n\n  Started: {}\n  Completed: {}  Failed: {}  Skipped: {}  Total: {}\n",
            format_section_heading("Last batch"),
            batch.started_at.to_rfc3339(),
            batch.completed,
            batch.failed,
            batch.skipped,
            batch.total
        ));
    }
    Ok(out)
}

pub fn format_runs(runs: &[RunRecord], format: &str) -> Result<String, PipelineError> {
    if format == "json" {
        return to_json(&runs);
    }
    if runs.is_empty() {
        return Ok("No runs recorded.\n".to_string());
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Run", "Command", "Status", "Total", "Done", "Failed", "Skipped"]);
    for run in runs {
        table.add_row(vec![
            run.run_id.clone(),
            run.command.clone(),
            run.status.as_str().to_string(),
            run.total.to_string(),
            run.completed.to_string(),
            run.failed.to_string(),
            run.skipped.to_string(),
        ]);
    }
    Ok(format!("{}\n{}\n", format_section_heading("Runs"), table))
}

pub fn format_events(events: &[RunEvent], format: &str) -> Result<String, PipelineError> {
    if format == "json" {
        return to_json(&events);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Seq", "Type", "Entry", "Data"]);
    for event in events {
        table.add_row(vec![
            event.seq.to_string(),
            event.event_type.clone(),
            event.entry_id.clone().unwrap_or_else(|| "-".to_string()),
            event.data.to_string(),
        ]);
    }
    Ok(format!("{}\n", table))
}
