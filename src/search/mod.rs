//! Semantic memory.
//!
//! Stores text documents with embeddings and answers nearest-neighbour
//! queries by brute-force cosine similarity:
//! - an [`EmbeddingProvider`] (local fastembed model or Gemini API)
//! - a [`DocumentRepository`] for durable storage (RocksDB)
//! - an in-memory cache mirror, hydrated once on first read
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌───────────────────┐
//! │  Document text  │────▶│ EmbeddingProvider │
//! └─────────────────┘     └─────────┬─────────┘
//!                                   │
//!                                   ▼
//!                           ┌──────────────┐
//!                           │  Embedding   │
//!                           │   Vec<f32>   │
//!                           └──────┬───────┘
//!                                  │
//!                       ┌──────────┴──────────┐
//!                       │                     │
//!                       ▼                     ▼
//!                ┌─────────────┐      ┌──────────────┐
//!                │   RocksDB   │─────▶│    Cache     │
//!                │ (persisted) │ once │  (BTreeMap)  │
//!                └─────────────┘      └──────┬───────┘
//!                                            │
//!                                            ▼
//!                                    ┌──────────────┐
//!                                    │ cosine scan  │
//!                                    │  top-k hits  │
//!                                    └──────────────┘
//! ```

mod document;
mod embedding;
mod repository;
mod similarity;
mod store;

pub use document::{now_millis, Metadata, ScoredDocument, StoreStats, VectorDocument};
pub use embedding::{
    build_provider, Embedding, EmbeddingProvider, EmbeddingService, EmbeddingServiceConfig,
    GeminiEmbedder, DEFAULT_GEMINI_MODEL, GEMINI_EMBEDDING_DIM,
};
pub use repository::{DocumentRepository, MemoryRepository, RocksRepository};
pub use similarity::cosine_similarity;
pub use store::{SemanticStore, DIGEST_TEXT_CHARS};

/// Default embedding model (all-MiniLM-L6-v2 - 384 dimensions, good balance of speed/quality)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Embedding dimension for the default model
pub const EMBEDDING_DIM: usize = 384;

/// Default number of search results.
pub const DEFAULT_SEARCH_K: usize = 5;

/// Default size of the recent-documents listing.
pub const DEFAULT_RECENT_LIMIT: usize = 50;
