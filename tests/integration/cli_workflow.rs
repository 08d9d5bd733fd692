//! End-to-end through the CLI route with the offline scripted backend.

use clap::Parser;
use quire::cli::{Cli, RunContext};
use quire::fingerprint::record_name;
use std::path::Path;
use tempfile::TempDir;

const CONFIG: &str = r#"
[backend]
kind = "scripted"
model = "echo"

[generation]
max_attempts = 2

[rubrics.section]
pass_threshold = 80.0
min_words = 3

[[rubrics.section.criteria]]
name = "length"
weight = 1.0
measure = { kind = "length" }

[[rubrics.section.tiers]]
label = "A"
min = 95.0
max = 100.0

[[rubrics.section.tiers]]
label = "B"
min = 80.0
max = 94.0

[[rubrics.section.tiers]]
label = "C"
min = 0.0
max = 79.0

[rubrics.entry]
pass_threshold = 80.0
min_words = 5

[[rubrics.entry.criteria]]
name = "length"
weight = 1.0
measure = { kind = "length" }

[[rubrics.entry.tiers]]
label = "pass"
min = 80.0
max = 100.0

[[rubrics.entry.tiers]]
label = "fail"
min = 0.0
max = 79.0
"#;

const JOB: &str = r#"
title_template = "On {topic}"

[[sections]]
id = "summary"
title = "Summary"
prompt = "Summarize {topic} in a few words"

[[sections]]
id = "detail"
title = "Detail"
prompt = "Expand on {topic} after: {previous}"

[[entries]]
id = "mint"
topic = "Mint"
"#;

fn setup(dir: &Path) -> RunContext {
    let config = dir.join("quire.toml");
    std::fs::write(&config, CONFIG).unwrap();
    std::fs::write(dir.join("job.toml"), JOB).unwrap();
    RunContext::new(dir.to_path_buf(), Some(config)).unwrap()
}

fn execute(ctx: &RunContext, args: &[&str]) -> quire::cli::CommandOutput {
    let cli = Cli::try_parse_from(std::iter::once("quire").chain(args.iter().copied())).unwrap();
    ctx.execute(&cli.command).unwrap()
}

#[test]
fn test_batch_then_stats_then_rerun_then_runs() {
    let dir = TempDir::new().unwrap();
    let ctx = setup(dir.path());
    let job = dir.path().join("job.toml");
    let job = job.to_str().unwrap();

    let first = execute(&ctx, &["batch", job, "--format", "json"]);
    assert!(first.success, "{}", first.text);
    let stats: serde_json::Value = serde_json::from_str(&first.text).unwrap();
    assert_eq!(stats["completed"], 1);

    let document = std::fs::read_to_string(ctx.paths().output.join(format!("{}.md", record_name("mint")))).unwrap();
    assert!(document.starts_with("# On Mint\n"));
    assert!(document.contains("## Summary"));
    assert!(document.contains("## Detail"));

    let workspace = execute(&ctx, &["stats", "--format", "json"]);
    let workspace: serde_json::Value = serde_json::from_str(&workspace.text).unwrap();
    assert_eq!(workspace["finished_documents"], 1);
    assert_eq!(workspace["checkpoints"].as_array().unwrap().len(), 0);
    assert!(workspace["disk"]["records"].as_u64().unwrap() >= 2);
    assert_eq!(workspace["last_batch"]["completed"], 1);
    assert!(workspace.get("cache").is_none());

    let second = execute(&ctx, &["batch", job, "--format", "json"]);
    let second: serde_json::Value = serde_json::from_str(&second.text).unwrap();
    assert_eq!(second["skipped"], 1);
    assert_eq!(second["completed"], 0);

    let runs = execute(&ctx, &["runs", "--format", "json"]);
    let runs: serde_json::Value = serde_json::from_str(&runs.text).unwrap();
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r["status"] == "completed"));

    let run_id = runs[1]["run_id"].as_str().unwrap();
    let events = execute(&ctx, &["runs", "--events", run_id, "--format", "json"]);
    assert!(events.text.contains("entry_completed"));
}

#[test]
fn test_reset_removes_checkpoint_and_output() {
    let dir = TempDir::new().unwrap();
    let ctx = setup(dir.path());
    let job = dir.path().join("job.toml");

    let generated = execute(&ctx, &["generate", job.to_str().unwrap(), "mint"]);
    assert!(generated.success);
    assert!(generated.text.contains("On Mint"));
    let document = ctx.paths().output.join(format!("{}.md", record_name("mint")));
    assert!(document.exists());

    let reset = execute(&ctx, &["reset", "mint", "--output"]);
    assert!(reset.success);
    assert!(!document.exists());
}

#[test]
fn test_score_uses_configured_rubric() {
    let dir = TempDir::new().unwrap();
    let ctx = setup(dir.path());
    let draft = dir.path().join("draft.txt");

    std::fs::write(&draft, "one two").unwrap();
    assert!(!execute(&ctx, &["score", draft.to_str().unwrap()]).success);

    std::fs::write(&draft, "one two three four").unwrap();
    let scored = execute(&ctx, &["score", draft.to_str().unwrap(), "--format", "json"]);
    assert!(scored.success);
    let report: serde_json::Value = serde_json::from_str(&scored.text).unwrap();
    assert_eq!(report["tier"], "A");
}
