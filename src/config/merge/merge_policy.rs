//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources win key by key; tables merge, arrays are replaced whole (a
//! rubric's `criteria` list is never spliced with the default one).

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.state_dir", ".quire")?
        .set_default("storage.output_dir", "output")?
        .set_default("backend.kind", "ollama")?
        .set_default("backend.model", "llama3")?
        .set_default("generation.max_attempts", 3)?
        .set_default("generation.max_assembly_attempts", 2)?
        .set_default("batch.stats_flush_every", 10)
}
