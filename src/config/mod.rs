// Configuration management module
// TOML settings under the base directory plus the interactive setup

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, CorrectionConfig, GenerationConfig, GenerationProvider, IngestConfig,
    OllamaConfig, RetrievalConfig, StoreConfig,
};

/// Resolve the base directory: an explicit override or `~/.code-doc-helper`
#[inline]
pub fn resolve_base_dir(
    override_dir: Option<std::path::PathBuf>,
) -> Result<std::path::PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => Config::default_base_dir(),
    }
}
