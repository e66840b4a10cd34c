//! `config show` / `config validate`: inspect the resolved configuration.

use crate::config::ResolvedConfig;
use crate::output::{Output, OutputFormat};
use serde::Serialize;

/// `rag-diary config validate`: run [`rag_core::EngineConfig::validate`] and
/// report the result.
pub fn validate(config: &ResolvedConfig, format: OutputFormat) -> anyhow::Result<()> {
    let outcome = match config.engine.validate() {
        Ok(()) => ValidateResult { valid: true, error: None },
        Err(err) => ValidateResult { valid: false, error: Some(err.to_string()) },
    };
    format.print(&outcome)
}

/// `rag-diary config show`: print the resolved state directory and the
/// non-secret parts of the engine configuration.
pub fn show(config: &ResolvedConfig, format: OutputFormat) -> anyhow::Result<()> {
    let view = ConfigView {
        state_dir: config.state_dir.display().to_string(),
        api_url: config.engine.api_url.clone(),
        api_key_set: config.engine.api_key.as_deref().is_some_and(|k| !k.is_empty()),
        vectordb_dimension: config.engine.vectordb_dimension,
        default_timezone: config.engine.default_timezone.clone(),
    };
    format.print(&view)
}

#[derive(Debug, Serialize)]
struct ValidateResult {
    valid: bool,
    error: Option<String>,
}

impl Output for ValidateResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.valid {
            writeln!(writer, "config is valid")?;
        } else {
            writeln!(writer, "config is invalid: {}", self.error.as_deref().unwrap_or("unknown error"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ConfigView {
    state_dir: String,
    api_url: Option<String>,
    api_key_set: bool,
    vectordb_dimension: Option<usize>,
    default_timezone: String,
}

impl Output for ConfigView {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "state_dir: {}", self.state_dir)?;
        writeln!(writer, "api_url: {}", self.api_url.as_deref().unwrap_or("(unset)"))?;
        writeln!(writer, "api_key: {}", if self.api_key_set { "(set)" } else { "(unset)" })?;
        writeln!(
            writer,
            "vectordb_dimension: {}",
            self.vectordb_dimension.map_or("(unset)".to_string(), |d| d.to_string())
        )?;
        writeln!(writer, "default_timezone: {}", self.default_timezone)?;
        Ok(())
    }
}
