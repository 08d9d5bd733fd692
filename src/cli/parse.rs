//! CLI parse: clap types for quire. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quire CLI - quality-gated document generation
#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Generate long-form documents section by section, validated, cached and resumable")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate one entry of a job, resuming from its checkpoint
    Generate {
        /// Job file (TOML)
        job: PathBuf,
        /// Entry id from the job file
        entry: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Generate every unfinished entry of a job
    Batch {
        /// Job file (TOML)
        job: PathBuf,
        /// Only these entry ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show cache, checkpoint and output statistics
    Stats {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Score a text file against the section rubric (or the entry rubric)
    Score {
        /// Text file to score
        file: PathBuf,
        /// Use the whole-entry rubric
        #[arg(long)]
        entry: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Discard an entry's checkpoint so it starts over
    Reset {
        /// Entry id
        entry: String,
        /// Also remove the finished document and report
        #[arg(long)]
        output: bool,
    },
    /// List recorded batch runs
    Runs {
        /// Show at most this many runs
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Keep only this many finished runs, deleting older ones
        #[arg(long)]
        prune: Option<usize>,
        /// Show the events of one run
        #[arg(long)]
        events: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
