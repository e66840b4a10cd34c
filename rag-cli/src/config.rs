//! CLI-level configuration: the engine config used by `rag-core`, plus the
//! on-disk locations this binary manages itself (state directory, TOML file
//! path resolution), layered in the same `[cli]`-table-alongside-engine-
//! fields shape as the engine config file itself.

use anyhow::Context;
use rag_core::EngineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI-only settings that live alongside the engine config in the same TOML
/// file, under a `[cli]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    /// Directory holding persisted per-diary indexes and the cooccurrence db.
    pub state_dir: Option<PathBuf>,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self { state_dir: None }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawConfigFile {
    #[serde(default)]
    cli: CliSettings,
}

/// Fully resolved configuration: the engine config `rag-core` needs, the CLI
/// settings this binary manages, and the state directory every command reads
/// from and writes to.
pub struct ResolvedConfig {
    pub engine: EngineConfig,
    pub cli: CliSettings,
    pub state_dir: PathBuf,
}

impl ResolvedConfig {
    /// Load from `path` if given, else from the platform config directory's
    /// default filename. Falls back to built-in defaults.
    ///
    /// Deliberately does not enforce `EngineConfig::validate` here: `config
    /// show`/`config validate` need to report on a config that might be
    /// incomplete, and commands that actually need a usable embedding client
    /// fail naturally when they try to build one from an empty `api_key`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let resolved_path = path.map(Path::to_path_buf).or_else(default_config_path);

        let cli = match &resolved_path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p.display()))?;
                let parsed: RawConfigFile = toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", p.display()))?;
                parsed.cli
            }
            _ => CliSettings::default(),
        };

        let engine = EngineConfig::load_unvalidated(resolved_path.as_deref())
            .context("loading engine configuration")?;

        let state_dir = cli
            .state_dir
            .clone()
            .or_else(default_state_dir)
            .unwrap_or_else(|| PathBuf::from("./rag-diary-state"));

        Ok(Self { engine, cli, state_dir })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rag-diary").join("config.toml"))
}

fn default_state_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("rag-diary"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_default_cli_settings() {
        let resolved = ResolvedConfig::load(Some(Path::new("/nonexistent/does/not/exist.toml")))
            .expect("a missing config file is not an error, just defaults");
        assert!(!resolved.state_dir.as_os_str().is_empty());
        assert!(resolved.engine.api_url.is_none());
    }

    #[test]
    fn parses_cli_table_alongside_engine_fields() {
        let toml_text = r#"
            api_url = "https://api.example.com"
            api_key = "sk-test"
            vectordb_dimension = 8

            [cli]
            state_dir = "/tmp/rag-diary-test-state"
        "#;
        let parsed: RawConfigFile = toml::from_str(toml_text).unwrap();
        assert_eq!(parsed.cli.state_dir, Some(PathBuf::from("/tmp/rag-diary-test-state")));
    }
}
