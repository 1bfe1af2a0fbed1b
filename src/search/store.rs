//! Semantic memory store.
//!
//! Documents are persisted through a [`DocumentRepository`] and mirrored in
//! an in-memory cache that is hydrated lazily, once, on the first read.
//!
//! Search is a brute-force cosine scan: O(N·d) per query for N documents of
//! dimension d. That is fine for the low thousands of documents this store
//! targets and is the first thing to replace (with an ANN index) beyond it.

use chrono::{DateTime, SecondsFormat, Utc};
use static_assertions::assert_impl_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use super::document::{now_millis, Metadata, ScoredDocument, StoreStats, VectorDocument};
use super::embedding::EmbeddingProvider;
use super::repository::DocumentRepository;
use super::similarity::cosine_similarity;
use crate::error::{Error, Result};

/// Characters of text kept per digest line.
pub const DIGEST_TEXT_CHARS: usize = 300;

/// Source label used in digests when a document has none.
const UNKNOWN_SOURCE: &str = "Unknown";

/// Semantic document store.
///
/// The cache is keyed by id in a `BTreeMap`, so iteration order (and with
/// it every tie-break) is ascending id.
pub struct SemanticStore {
    embedder: Arc<dyn EmbeddingProvider>,
    repository: Arc<dyn DocumentRepository>,
    cache: RwLock<BTreeMap<String, VectorDocument>>,
    hydrated: OnceCell<()>,
    clock: fn() -> u64,
}

assert_impl_all!(SemanticStore: Send, Sync);

impl SemanticStore {
    /// Create a store over the given provider and repository.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        repository: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self {
            embedder,
            repository,
            cache: RwLock::new(BTreeMap::new()),
            hydrated: OnceCell::new(),
            clock: now_millis,
        }
    }

    /// Replace the insertion clock (milliseconds since epoch).
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Whether the cache has been loaded from persistence.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.initialized()
    }

    /// Load every persisted document into the cache, at most once.
    ///
    /// Concurrent callers share one in-flight hydration. A failed hydration
    /// leaves the store un-hydrated so the next call retries.
    async fn ensure_hydrated(&self) -> Result<()> {
        self.hydrated
            .get_or_try_init(|| async {
                // Writers hold this lock across persist+cache, so the
                // snapshot below cannot miss a concurrent write.
                let mut cache = self.cache.write().await;
                let docs = self.repository.get_all().await?;
                cache.clear();
                for doc in docs {
                    cache.insert(doc.id.clone(), doc);
                }
                info!(documents = cache.len(), "[Memory] Cache hydrated");
                Ok::<(), Error>(())
            })
            .await
            .map(|_| ())
    }

    /// Embed and persist a document, replacing any document with the same id.
    ///
    /// Nothing is written if embedding fails.
    pub async fn store_document(
        &self,
        id: &str,
        text: &str,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let embedding = self.embedder.embed(text).await.map_err(|e| {
            warn!(id, error = %e, "[Memory] Failed to embed document");
            e
        })?;

        let doc = VectorDocument {
            id: id.to_string(),
            text: text.to_string(),
            embedding,
            metadata: metadata.unwrap_or_default(),
            timestamp: (self.clock)(),
        };

        let mut cache = self.cache.write().await;
        self.repository.put(&doc).await?;
        cache.insert(doc.id.clone(), doc);
        drop(cache);

        metrics::counter!("synapse_documents_stored_total").increment(1);
        info!(id, "[Memory] Stored document");
        Ok(())
    }

    /// Top `k` documents by cosine similarity to `query`, best first.
    ///
    /// Documents whose similarity is undefined (zero norm, other
    /// dimensionality) are left out. Equal scores keep ascending-id order.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        let query_embedding = self.embedder.embed(query).await?;
        self.ensure_hydrated().await?;
        metrics::counter!("synapse_searches_total").increment(1);

        let cache = self.cache.read().await;
        let mut scored: Vec<ScoredDocument> = cache
            .values()
            .filter_map(|doc| {
                cosine_similarity(&query_embedding, &doc.embedding).map(|score| ScoredDocument {
                    document: doc.clone(),
                    score,
                })
            })
            .collect();
        let skipped = cache.len() - scored.len();
        drop(cache);

        if skipped > 0 {
            debug!(skipped, "[Memory] Documents with undefined similarity skipped");
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Most recent documents first, at most `limit`.
    ///
    /// Equal timestamps keep ascending-id order.
    pub async fn recent_documents(&self, limit: usize) -> Result<Vec<VectorDocument>> {
        self.ensure_hydrated().await?;
        let mut docs: Vec<VectorDocument> = self.cache.read().await.values().cloned().collect();
        docs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        docs.truncate(limit);
        Ok(docs)
    }

    /// Look up one document by id.
    pub async fn get_document(&self, id: &str) -> Result<Option<VectorDocument>> {
        self.ensure_hydrated().await?;
        Ok(self.cache.read().await.get(id).cloned())
    }

    /// Remove a document from persistence and cache.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut cache = self.cache.write().await;
        let existed = self.repository.delete(id).await?;
        cache.remove(id);
        drop(cache);

        if existed {
            info!(id, "[Memory] Deleted document");
        }
        Ok(existed)
    }

    /// Persisted document count. Does not hydrate the cache.
    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_documents: self.repository.count().await?,
        })
    }

    /// One line per recent document, for downstream summarisation:
    /// `[<date>] [<source>] <text prefix>...`
    pub async fn digest(&self, limit: usize) -> Result<Vec<String>> {
        let docs = self.recent_documents(limit).await?;
        Ok(docs.iter().map(digest_line).collect())
    }
}

fn digest_line(doc: &VectorDocument) -> String {
    let date = i64::try_from(doc.timestamp)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| doc.timestamp.to_string());
    let source = doc.source().unwrap_or(UNKNOWN_SOURCE);
    let prefix: String = doc.text.chars().take(DIGEST_TEXT_CHARS).collect();
    format!("[{}] [{}] {}...", date, source, prefix)
}
