//! Engine configuration: every tunable knob the retrieval pipeline reads.
//!
//! Sources layer in order: defaults, then an optional TOML file, then
//! environment variable overrides named after each field's
//! `SCREAMING_SNAKE_CASE` knob.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Embedding/chat backend base URL (`API_URL`).
    pub api_url: Option<String>,
    /// Embedding/chat backend API key (`API_Key`).
    pub api_key: Option<String>,
    /// Embedding model allow-list (`WhitelistEmbeddingModel`).
    pub whitelist_embedding_model: Vec<String>,
    /// Embedding vector dimensionality (`VECTORDB_DIMENSION`). Mandatory.
    pub vectordb_dimension: Option<usize>,
    /// IANA timezone used to interpret "today" (`DEFAULT_TIMEZONE`).
    pub default_timezone: String,

    /// Query result cache capacity (`RAG_CACHE_MAX_SIZE`).
    pub rag_cache_max_size: usize,
    /// Query result cache TTL in milliseconds (`RAG_CACHE_TTL_MS`).
    pub rag_cache_ttl_ms: u64,
    /// Whether the query result cache is enabled (`RAG_QUERY_CACHE_ENABLED`).
    pub rag_query_cache_enabled: bool,

    /// Embedding cache capacity (`EMBEDDING_CACHE_MAX_SIZE`).
    pub embedding_cache_max_size: usize,
    /// Embedding cache TTL in milliseconds (`EMBEDDING_CACHE_TTL_MS`).
    pub embedding_cache_ttl_ms: u64,

    /// Rerank HTTP endpoint (`RerankUrl`).
    pub rerank_url: Option<String>,
    /// Rerank HTTP API key (`RerankApi`).
    pub rerank_api: Option<String>,
    /// Rerank model identifier (`RerankModel`).
    pub rerank_model: Option<String>,
    /// Candidate multiplier: fetch `ceil(k * multiplier)` before reranking
    /// (`RerankMultiplier`).
    pub rerank_multiplier: f32,
    /// Token budget per rerank HTTP batch (`RerankMaxTokensPerBatch`).
    pub rerank_max_tokens_per_batch: usize,

    /// Tags vectorized per batch (`TAG_VECTORDB_BATCH_SIZE`).
    pub tag_vectordb_batch_size: usize,
    /// Concurrency for tag vectorization (`TAG_VECTORIZE_CONCURRENCY`).
    pub tag_vectorize_concurrency: usize,
    /// Tags per persisted vector shard (`TAG_SAVE_SHARD_SIZE`).
    pub tag_save_shard_size: usize,
    /// Merge window for batched index rebuilds, ms (`TAG_INDEX_REBUILD_DELAY`).
    pub tag_index_rebuild_delay_ms: u64,
    /// Debounce before cooccurrence matrix export, ms
    /// (`TAG_MATRIX_EXPORT_DELAY`).
    pub tag_matrix_export_delay_ms: u64,

    /// Substrings removed from every tag before validation (`TAG_BLACKLIST_SUPER`).
    pub tag_blacklist_super: Vec<String>,
    /// Tags rejected outright after blacklist removal (`TAG_BLACKLIST`).
    pub tag_blacklist: Vec<String>,
    /// Minimum valid tag length, in characters, after blacklist removal.
    pub tag_min_len: usize,
    /// Maximum valid tag length, in characters.
    pub tag_max_len: usize,
    /// Exact folder names to skip (`TAG_IGNORE_FOLDERS`).
    pub tag_ignore_folders: Vec<String>,
    /// Folder name prefixes to skip (`TAG_IGNORE_PREFIX`).
    pub tag_ignore_prefix: Vec<String>,
    /// Folder name suffixes to skip (`TAG_IGNORE_SUFFIX`).
    pub tag_ignore_suffix: Vec<String>,

    /// Minimum per-edge weight considered by tag expansion
    /// (`TAG_EXPAND_MIN_WEIGHT`).
    pub tag_expand_min_weight: u32,
    /// Maximum tags returned by tag expansion (`TAG_EXPAND_MAX_COUNT`).
    pub tag_expand_max_count: usize,
    /// Whether tag expansion prefers multi-source candidates
    /// (`TAG_EXPAND_PREFER_MULTI_SOURCE`).
    pub tag_expand_prefer_multi_source: bool,

    /// Per-diary name-similarity gate threshold for standard/hybrid/gated
    /// placeholders (`RAG_GATE_THRESHOLD`).
    pub rag_gate_threshold: f32,
    /// Default auto-mode theme-routing threshold for meta-thinking chains
    /// when a placeholder doesn't override it (`META_THINKING_AUTO_THRESHOLD`).
    pub meta_thinking_auto_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            whitelist_embedding_model: Vec::new(),
            vectordb_dimension: None,
            default_timezone: DEFAULT_TIMEZONE.to_string(),

            rag_cache_max_size: DEFAULT_RAG_CACHE_MAX_SIZE,
            rag_cache_ttl_ms: DEFAULT_RAG_CACHE_TTL_MS,
            rag_query_cache_enabled: true,

            embedding_cache_max_size: DEFAULT_EMBEDDING_CACHE_MAX_SIZE,
            embedding_cache_ttl_ms: DEFAULT_EMBEDDING_CACHE_TTL_MS,

            rerank_url: None,
            rerank_api: None,
            rerank_model: None,
            rerank_multiplier: DEFAULT_RERANK_MULTIPLIER,
            rerank_max_tokens_per_batch: DEFAULT_RERANK_MAX_TOKENS_PER_BATCH,

            tag_vectordb_batch_size: DEFAULT_TAG_VECTORDB_BATCH_SIZE,
            tag_vectorize_concurrency: DEFAULT_TAG_VECTORIZE_CONCURRENCY,
            tag_save_shard_size: DEFAULT_TAG_SAVE_SHARD_SIZE,
            tag_index_rebuild_delay_ms: DEFAULT_TAG_INDEX_REBUILD_DELAY_MS,
            tag_matrix_export_delay_ms: DEFAULT_TAG_MATRIX_EXPORT_DELAY_MS,

            tag_blacklist_super: Vec::new(),
            tag_blacklist: Vec::new(),
            tag_min_len: DEFAULT_TAG_MIN_LEN,
            tag_max_len: DEFAULT_TAG_MAX_LEN,
            tag_ignore_folders: Vec::new(),
            tag_ignore_prefix: Vec::new(),
            tag_ignore_suffix: Vec::new(),

            tag_expand_min_weight: DEFAULT_TAG_EXPAND_MIN_WEIGHT,
            tag_expand_max_count: DEFAULT_TAG_EXPAND_MAX_COUNT,
            tag_expand_prefer_multi_source: DEFAULT_TAG_EXPAND_PREFER_MULTI_SOURCE,

            rag_gate_threshold: DEFAULT_RAG_GATE_THRESHOLD,
            meta_thinking_auto_threshold: DEFAULT_META_THINKING_AUTO_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment-variable overrides, then validate mandatory fields.
    ///
    /// # Errors
    /// Returns [`Error::ConfigInvalid`] if the file can't be parsed, or if a
    /// mandatory field (`API_URL`, `API_Key`, `VECTORDB_DIMENSION`) is
    /// missing after layering.
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let config = Self::load_unvalidated(toml_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Same layering as [`Self::load`] (file, then env overrides) without the
    /// final [`Self::validate`] call. Lets callers that want to report
    /// validation problems rather than abort on them (a `config show` or
    /// `config validate` command) inspect a config built from a file that
    /// hasn't yet passed validation.
    ///
    /// # Errors
    /// Returns [`Error::ConfigInvalid`] if the file can't be parsed.
    pub fn load_unvalidated(toml_path: Option<&Path>) -> Result<Self> {
        let mut config = match toml_path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)
                    .map_err(|e| Error::ConfigInvalid(format!("invalid config file: {e}")))?
            }
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("API_URL") {
            self.api_url = Some(v);
        }
        if let Ok(v) = std::env::var("API_Key") {
            self.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("VECTORDB_DIMENSION") {
            if let Ok(parsed) = v.parse() {
                self.vectordb_dimension = Some(parsed);
            }
        }
        if let Ok(v) = std::env::var("DEFAULT_TIMEZONE") {
            self.default_timezone = v;
        }
        if let Ok(v) = std::env::var("RAG_CACHE_MAX_SIZE") {
            if let Ok(parsed) = v.parse() {
                self.rag_cache_max_size = parsed;
            }
        }
        if let Ok(v) = std::env::var("RAG_CACHE_TTL_MS") {
            if let Ok(parsed) = v.parse() {
                self.rag_cache_ttl_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("RAG_QUERY_CACHE_ENABLED") {
            self.rag_query_cache_enabled = matches!(v.as_str(), "1" | "true" | "TRUE");
        }
        if let Ok(v) = std::env::var("EMBEDDING_CACHE_MAX_SIZE") {
            if let Ok(parsed) = v.parse() {
                self.embedding_cache_max_size = parsed;
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_CACHE_TTL_MS") {
            if let Ok(parsed) = v.parse() {
                self.embedding_cache_ttl_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("RerankUrl") {
            self.rerank_url = Some(v);
        }
        if let Ok(v) = std::env::var("RerankApi") {
            self.rerank_api = Some(v);
        }
        if let Ok(v) = std::env::var("RerankModel") {
            self.rerank_model = Some(v);
        }
        if let Ok(v) = std::env::var("RerankMultiplier") {
            if let Ok(parsed) = v.parse() {
                self.rerank_multiplier = parsed;
            }
        }
        if let Ok(v) = std::env::var("TAG_BLACKLIST") {
            self.tag_blacklist = split_csv(&v);
        }
        if let Ok(v) = std::env::var("TAG_BLACKLIST_SUPER") {
            self.tag_blacklist_super = split_csv(&v);
        }
        if let Ok(v) = std::env::var("TAG_IGNORE_FOLDERS") {
            self.tag_ignore_folders = split_csv(&v);
        }
        if let Ok(v) = std::env::var("TAG_IGNORE_PREFIX") {
            self.tag_ignore_prefix = split_csv(&v);
        }
        if let Ok(v) = std::env::var("TAG_IGNORE_SUFFIX") {
            self.tag_ignore_suffix = split_csv(&v);
        }
        if let Ok(v) = std::env::var("TAG_EXPAND_MIN_WEIGHT") {
            if let Ok(parsed) = v.parse() {
                self.tag_expand_min_weight = parsed;
            }
        }
        if let Ok(v) = std::env::var("TAG_EXPAND_MAX_COUNT") {
            if let Ok(parsed) = v.parse() {
                self.tag_expand_max_count = parsed;
            }
        }
        if let Ok(v) = std::env::var("TAG_EXPAND_PREFER_MULTI_SOURCE") {
            self.tag_expand_prefer_multi_source = matches!(v.as_str(), "1" | "true" | "TRUE");
        }
        if let Ok(v) = std::env::var("RAG_GATE_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                self.rag_gate_threshold = parsed;
            }
        }
        if let Ok(v) = std::env::var("META_THINKING_AUTO_THRESHOLD") {
            if let Ok(parsed) = v.parse() {
                self.meta_thinking_auto_threshold = parsed;
            }
        }
    }

    /// Validate mandatory fields, returning [`Error::ConfigInvalid`] for the
    /// first one missing.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::ConfigInvalid("API_URL is required".to_string()));
        }
        if self.api_key.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::ConfigInvalid("API_Key is required".to_string()));
        }
        if self.vectordb_dimension.is_none_or(|d| d == 0) {
            return Err(Error::ConfigInvalid(
                "VECTORDB_DIMENSION must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// A stable hash of the tag-related configuration, used to invalidate the
    /// query result cache when `rag_tags` config changes.
    #[must_use]
    pub fn rag_tags_config_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.tag_blacklist.join(","));
        hasher.update(self.tag_blacklist_super.join(","));
        hasher.update(self.tag_ignore_folders.join(","));
        hasher.update(self.tag_ignore_prefix.join(","));
        hasher.update(self.tag_ignore_suffix.join(","));
        format!("{:x}", hasher.finalize())
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_without_mandatory_fields() {
        let config = EngineConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_passes_with_mandatory_fields_set() {
        let mut config = EngineConfig::default();
        config.api_url = Some("https://api.example.com".to_string());
        config.api_key = Some("sk-test".to_string());
        config.vectordb_dimension = Some(1536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_hash_changes_when_blacklist_changes() {
        let mut a = EngineConfig::default();
        let hash_a = a.rag_tags_config_hash();
        a.tag_blacklist.push("spam".to_string());
        let hash_b = a.rag_tags_config_hash();
        assert_ne!(hash_a, hash_b);
    }
}
