//! Default values for every configuration knob, used when a TOML file or
//! environment override does not set one explicitly.

/// Default query-result cache capacity.
pub const DEFAULT_RAG_CACHE_MAX_SIZE: usize = 100;
/// Default query-result cache TTL, in milliseconds.
pub const DEFAULT_RAG_CACHE_TTL_MS: u64 = 3_600_000;
/// Default embedding cache capacity.
pub const DEFAULT_EMBEDDING_CACHE_MAX_SIZE: usize = 500;
/// Default embedding cache TTL, in milliseconds.
pub const DEFAULT_EMBEDDING_CACHE_TTL_MS: u64 = 7_200_000;

/// Default per-diary name-similarity gate threshold; a single global default
/// stands in for all diaries rather than a per-diary override (see
/// `DESIGN.md`).
pub const DEFAULT_RAG_GATE_THRESHOLD: f32 = 0.3;
/// Default auto-mode theme-routing threshold for meta-thinking chain
/// resolution.
pub const DEFAULT_META_THINKING_AUTO_THRESHOLD: f32 = 0.65;

/// Default rerank candidate multiplier (`k' = ceil(k * multiplier)`).
pub const DEFAULT_RERANK_MULTIPLIER: f32 = 2.0;
/// Default token budget per rerank HTTP batch.
pub const DEFAULT_RERANK_MAX_TOKENS_PER_BATCH: usize = 30_000;

/// Default number of tags vectorized per batch.
pub const DEFAULT_TAG_VECTORDB_BATCH_SIZE: usize = 100;
/// Default concurrency for tag vectorization requests.
pub const DEFAULT_TAG_VECTORIZE_CONCURRENCY: usize = 5;
/// Default number of tags per persisted vector shard.
pub const DEFAULT_TAG_SAVE_SHARD_SIZE: usize = 2_000;
/// Default merge window for the batched index-rebuild scheduler, in ms.
pub const DEFAULT_TAG_INDEX_REBUILD_DELAY_MS: u64 = 60_000;
/// Default debounce before the cooccurrence matrix is exported, in ms.
pub const DEFAULT_TAG_MATRIX_EXPORT_DELAY_MS: u64 = 30_000;

/// Default minimum edge weight considered during tag expansion.
pub const DEFAULT_TAG_EXPAND_MIN_WEIGHT: u32 = 2;
/// Default maximum number of expanded tags returned.
pub const DEFAULT_TAG_EXPAND_MAX_COUNT: usize = 10;
/// Default `prefer_multi_source` ranking mode for tag expansion.
pub const DEFAULT_TAG_EXPAND_PREFER_MULTI_SOURCE: bool = true;

/// Default IANA timezone used to interpret "today" in time expressions.
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

/// Per-directory debounce window for file-watch events, in ms.
pub const FILE_WATCH_DEBOUNCE_MS: u64 = 500;

/// Growth factor applied to `VectorIndex::resize` when capacity threshold is
/// crossed.
pub const INDEX_GROWTH_FACTOR: f64 = 1.5;
/// Fraction of capacity at which a resize is triggered.
pub const INDEX_GROWTH_THRESHOLD: f64 = 0.9;

/// HNSW construction parameter: max connections per node.
pub const HNSW_MAX_NB_CONNECTION: usize = 16;
/// HNSW construction parameter: max number of layers.
pub const HNSW_MAX_LAYER: usize = 16;
/// HNSW construction parameter: `ef_construction`.
pub const HNSW_EF_CONSTRUCTION: usize = 200;
/// HNSW search parameter: default `ef_search` when the caller does not
/// override it.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 64;

/// Minimum valid tag length after blacklist/whitespace trimming.
pub const DEFAULT_TAG_MIN_LEN: usize = 1;
/// Maximum valid tag length.
pub const DEFAULT_TAG_MAX_LEN: usize = 64;

/// Current on-disk format version written into every JSON artifact's
/// `version` field.
pub const ARTIFACT_VERSION: &str = "1.0.0";
