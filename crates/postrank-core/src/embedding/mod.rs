//! ============================================================================
//! Embeddings - provider client and the rate-limited batcher
//! ============================================================================

pub mod batcher;
pub mod service;

pub use batcher::{BatchOutcome, EmbeddingBatcher, QuotaPolicy};
pub use service::{EmbeddingProvider, EmbeddingService, DEFAULT_EMBEDDING_MODEL, EMBEDDING_DIM};
