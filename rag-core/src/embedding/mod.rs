//! Batch text→vector embedding with retry/backoff.

mod cache;
mod http;
mod provider;
pub mod similarity;

pub use cache::EmbeddingCache;
pub use http::{HttpEmbeddingClient, HttpEmbeddingConfig};
pub use provider::{EmbeddingClient, EmbeddingMetrics};
