//! CLI help and command-name contract for logging and the run ledger.

use crate::cli::parse::Commands;

/// Command name recorded in logs and ledger runs (e.g. "batch", "runs").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Generate { .. } => "generate",
        Commands::Batch { .. } => "batch",
        Commands::Stats { .. } => "stats",
        Commands::Score { .. } => "score",
        Commands::Reset { .. } => "reset",
        Commands::Runs { .. } => "runs",
    }
}

/// Requested output format, if the command has one.
pub fn output_format(command: &Commands) -> Option<&str> {
    match command {
        Commands::Generate { format, .. }
        | Commands::Batch { format, .. }
        | Commands::Stats { format }
        | Commands::Score { format, .. }
        | Commands::Runs { format, .. } => Some(format.as_str()),
        Commands::Reset { .. } => None,
    }
}
