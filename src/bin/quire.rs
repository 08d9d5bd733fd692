//! Quire CLI Binary
//!
//! Command-line interface for the quire generation pipeline.

use anyhow::Context;
use clap::Parser;
use quire::cli::{map_error, Cli, RunContext};
use quire::config::ConfigLoader;
use quire::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Quire CLI starting");

    match run(&cli) {
        Ok(true) => info!("Command completed successfully"),
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Execute the parsed command; `Ok(false)` means it ran but did not fully succeed.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())
        .map_err(|e| anyhow::anyhow!(map_error(&e)))
        .with_context(|| format!("initializing workspace {}", cli.workspace.display()))?;
    info!("CLI context initialized");

    let output = context
        .execute(&cli.command)
        .map_err(|e| anyhow::anyhow!(map_error(&e)))?;
    println!("{}", output.text.trim_end());
    Ok(output.success)
}

/// Build logging configuration from CLI args and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = match cli.config {
        Some(ref config_path) => ConfigLoader::load_from_file(config_path)
            .map(|c| c.logging)
            .unwrap_or_default(),
        None => ConfigLoader::load(&cli.workspace)
            .map(|c| c.logging)
            .unwrap_or_default(),
    };

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = file.clone();
    } else if config.file.is_relative() {
        config.file = cli.workspace.join(&config.file);
    }

    config
}
