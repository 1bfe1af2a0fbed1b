//! Synapse core: semantic memory and a scraping/tool policy gate.
//!
//! - [`search`]: embeds documents, persists them in RocksDB, answers
//!   cosine-similarity queries over an in-memory mirror
//! - [`policy`]: robots.txt compliance with an SSRF guard, plus a tool
//!   whitelist for MCP invocations
//! - [`api`]: axum HTTP surface over both

pub mod api;
pub mod config;
pub mod error;
pub mod policy;
pub mod search;

pub use api::{ApiServer, AppState};
pub use config::{
    ApiConfig, EmbeddingConfig, EmbeddingProviderKind, PolicyConfig, StoreConfig, SynapseConfig,
};
pub use error::{Error, Result};
pub use policy::{PolicyDecision, PolicyGate, ToolCall};
pub use search::{
    build_provider, EmbeddingProvider, EmbeddingService, GeminiEmbedder, RocksRepository,
    ScoredDocument, SemanticStore, StoreStats, VectorDocument,
};
