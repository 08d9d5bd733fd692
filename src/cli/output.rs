//! CLI output: error mapping and the result handed back to the binary.

use crate::error::PipelineError;

/// Rendered command output plus whether the command fully succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: false,
        }
    }
}

/// Map pipeline errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::ConfigError(msg) => format!("Configuration error: {}", msg),
        PipelineError::InvalidJob(msg) => format!("Invalid job: {}", msg),
        other => other.to_string(),
    }
}
