//! CLI domain: parse, route, help, output, and presentation only.
//! No pipeline logic; a single route table dispatches to pipeline services.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{command_name, output_format};
pub use output::{map_error, CommandOutput};
pub use parse::{Cli, Commands};
pub use presentation::{format_report_text, format_section_heading, WorkspaceStats};
pub use route::RunContext;
