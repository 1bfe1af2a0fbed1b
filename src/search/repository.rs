//! Durable document persistence.
//!
//! A key-value seam keyed by document id. Only single-document atomicity is
//! assumed; there are no transactions across documents.

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

use super::document::{StoredRecord, VectorDocument};
use crate::error::{Error, Result};

/// Column family holding the documents.
const CF_VECTORS: &str = "vectors";

/// Key-value persistence for documents.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert or replace the document under its id.
    async fn put(&self, doc: &VectorDocument) -> Result<()>;

    /// Load every persisted document.
    async fn get_all(&self) -> Result<Vec<VectorDocument>>;

    /// Remove a document. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Number of persisted documents.
    async fn count(&self) -> Result<usize>;
}

/// RocksDB-backed repository.
///
/// Key = id bytes, value = bincode record. RocksDB calls block, so they run
/// on the blocking pool.
#[derive(Clone)]
pub struct RocksRepository {
    db: Arc<DB>,
}

impl RocksRepository {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![ColumnFamilyDescriptor::new(CF_VECTORS, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to open document store");
            Error::Storage(format!("path={}: {}", path.display(), e))
        })?;

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

fn vectors_cf(db: &DB) -> Result<&rocksdb::ColumnFamily> {
    db.cf_handle(CF_VECTORS)
        .ok_or_else(|| Error::Storage(format!("Column family not found: {}", CF_VECTORS)))
}

#[async_trait]
impl DocumentRepository for RocksRepository {
    async fn put(&self, doc: &VectorDocument) -> Result<()> {
        let key = doc.id.clone().into_bytes();
        let value = StoredRecord::encode(doc)?;
        self.blocking(move |db| {
            db.put_cf(vectors_cf(db)?, key, value)?;
            Ok(())
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<VectorDocument>> {
        self.blocking(|db| {
            let cf = vectors_cf(db)?;
            let mut docs = Vec::new();
            for item in db.iterator_cf(cf, IteratorMode::Start) {
                let (_, value) = item?;
                docs.push(StoredRecord::decode(&value)?);
            }
            Ok(docs)
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let key = id.as_bytes().to_vec();
        self.blocking(move |db| {
            let cf = vectors_cf(db)?;
            let existed = db.get_pinned_cf(cf, &key)?.is_some();
            if existed {
                db.delete_cf(cf, &key)?;
            }
            Ok(existed)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.blocking(|db| {
            let cf = vectors_cf(db)?;
            let mut count = 0usize;
            for item in db.iterator_cf(cf, IteratorMode::Start) {
                item?;
                count += 1;
            }
            Ok(count)
        })
        .await
    }
}

/// In-process repository for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryRepository {
    docs: RwLock<BTreeMap<String, VectorDocument>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryRepository {
    async fn put(&self, doc: &VectorDocument) -> Result<()> {
        self.docs.write().await.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<VectorDocument>> {
        Ok(self.docs.read().await.values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.docs.write().await.remove(id).is_some())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.docs.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Metadata;
    use tempfile::tempdir;

    fn doc(id: &str, text: &str) -> VectorDocument {
        VectorDocument::new(id, text, vec![1.0, 0.0], Metadata::new())
    }

    #[tokio::test]
    async fn test_rocks_put_replaces_by_id() {
        let dir = tempdir().unwrap();
        let repo = RocksRepository::open(dir.path()).unwrap();

        repo.put(&doc("a", "first")).await.unwrap();
        repo.put(&doc("b", "other")).await.unwrap();
        repo.put(&doc("a", "second")).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        let all = repo.get_all().await.unwrap();
        let a = all.iter().find(|d| d.id == "a").unwrap();
        assert_eq!(a.text, "second");
    }

    #[tokio::test]
    async fn test_rocks_delete() {
        let dir = tempdir().unwrap();
        let repo = RocksRepository::open(dir.path()).unwrap();
        repo.put(&doc("a", "text")).await.unwrap();

        assert!(repo.delete("a").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rocks_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let repo = RocksRepository::open(dir.path()).unwrap();
            repo.put(&doc("persisted", "still here")).await.unwrap();
        }
        let repo = RocksRepository::open(dir.path()).unwrap();
        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "still here");
    }

    #[tokio::test]
    async fn test_memory_repository_crud() {
        let repo = MemoryRepository::new();
        repo.put(&doc("x", "one")).await.unwrap();
        repo.put(&doc("x", "two")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.get_all().await.unwrap()[0].text, "two");
        assert!(repo.delete("x").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
