#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

//! # Rag Core
//!
//! A diary-memory retrieval engine: chunked semantic search over per-diary
//! vector indexes, a global tag vocabulary with cooccurrence-based
//! expansion, locale-aware time-expression parsing, multi-stage
//! "meta-thinking" cluster chains, and a placeholder-driven query planner
//! that dispatches all of the above against a chat turn's system messages.
//!
//! ## Module organization
//!
//! ### Retrieval primitives
//! - [`vector_index`]: HNSW-backed approximate nearest-neighbor index with
//!   `hnsw_rs`-bypassing raw-vector persistence.
//! - [`shard_store`]: deterministic-hash sharded persistence for the global
//!   tag vector table.
//! - [`rag_diary_store`]: per-diary chunk storage with tag-boosted and
//!   rerank-backed search.
//! - [`embedding`]: the injected embedding client trait, its LRU+TTL cache,
//!   and an HTTP implementation.
//!
//! ### Tag subsystem
//! - [`tag`]: extraction, cooccurrence tracking, expansion, and the
//!   file-watching manager that keeps the global tag vocabulary current.
//!
//! ### Query-time subsystems
//! - [`time_parser`]: pure extraction of absolute day ranges from relative
//!   Chinese time phrases.
//! - [`semantic_group`]: keyword-activated query-vector enhancement.
//! - [`meta_thinking`]: recursive, vector-refined cluster-chain execution.
//! - [`query_planner`]: placeholder discovery and dispatch, tying every
//!   other subsystem together into `process_system_messages`.
//!
//! ### Support
//! - [`types`]: shared data types (`Chunk`, `SearchHit`, `TimeRange`).
//! - [`config`]: every configuration knob, loaded from TOML + environment.
//! - [`constants`]: default values for every knob.
//! - [`error`]: the crate's error taxonomy and propagation policy.
//! - [`monitoring`]: Prometheus-format metrics export.
//!
//! ## Quick start
//!
//! ```no_run
//! use rag_core::config::EngineConfig;
//! use rag_core::query_planner::{ChatMessage, QueryPlanner};
//! use rag_core::semantic_group::SemanticGroupManager;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example(embedder: Arc<dyn rag_core::embedding::EmbeddingClient>) {
//! let config = EngineConfig::default();
//! let planner = QueryPlanner::new(
//!     embedder,
//!     HashMap::new(),
//!     None,
//!     None,
//!     SemanticGroupManager::default(),
//!     config,
//! );
//!
//! let messages = vec![
//!     ChatMessage { role: "user".to_string(), content: "今天做了什么".to_string() },
//!     ChatMessage { role: "system".to_string(), content: "context: [[工作日记本]]".to_string() },
//! ];
//! let processed = planner.process_system_messages(messages).await;
//! # let _ = processed;
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod embedding;
pub mod error;
pub mod meta_thinking;
pub mod monitoring;
pub mod query_planner;
pub mod rag_diary_store;
pub mod semantic_group;
pub mod shard_store;
pub mod tag;
pub mod time_parser;
pub mod types;
pub mod vector_index;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use query_planner::{ChatMessage, QueryPlanner, RagSource};
pub use types::{Chunk, SearchHit, TimeRange};
