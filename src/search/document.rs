//! Document types stored in semantic memory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Open provenance bag attached to a document (author, source, url, ...).
pub type Metadata = HashMap<String, serde_json::Value>;

/// A text document with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Caller-supplied unique key.
    pub id: String,
    /// Document text.
    pub text: String,
    /// Embedding vector from the configured provider.
    pub embedding: Vec<f32>,
    /// Opaque metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Insertion time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl VectorDocument {
    /// Build a document stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata,
            timestamp: now_millis(),
        }
    }

    /// The `source` metadata field, if it is a string.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    #[serde(flatten)]
    pub document: VectorDocument,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_documents: usize,
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// On-disk record. bincode cannot decode `serde_json::Value`, so metadata
/// travels as a JSON string.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    id: String,
    text: String,
    embedding: Vec<f32>,
    metadata_json: String,
    timestamp: u64,
}

impl StoredRecord {
    pub(crate) fn encode(doc: &VectorDocument) -> crate::Result<Vec<u8>> {
        let record = StoredRecord {
            id: doc.id.clone(),
            text: doc.text.clone(),
            embedding: doc.embedding.clone(),
            metadata_json: serde_json::to_string(&doc.metadata)?,
            timestamp: doc.timestamp,
        };
        Ok(bincode::serialize(&record)?)
    }

    pub(crate) fn decode(bytes: &[u8]) -> crate::Result<VectorDocument> {
        let record: StoredRecord = bincode::deserialize(bytes)?;
        Ok(VectorDocument {
            id: record.id,
            text: record.text,
            embedding: record.embedding,
            metadata: serde_json::from_str(&record.metadata_json)?,
            timestamp: record.timestamp,
        })
    }
}
