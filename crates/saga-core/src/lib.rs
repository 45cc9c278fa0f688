//! Core types and error definitions for the saga retrieval workspace.
//!
//! This crate provides the foundational types shared across all saga crates,
//! including error handling, the passage record model, and retrieval result
//! representations.
//!
//! # Main types
//!
//! - [`SagaError`] — Unified error enum for all saga subsystems.
//! - [`SagaResult`] — Convenience alias for `Result<T, SagaError>`.
//! - [`DocumentRecord`] — A stored passage: id, text, embedding, metadata.
//! - [`RecordBatch`] — An ordered batch of records produced by ingestion.
//! - [`RetrievalHit`] — One stage-1 (embedding similarity) search result.
//! - [`RerankedResult`] — The two-stage retrieval output with both score columns.
//! - [`StoreMetadata`] — Catalog entry describing a registered store.
//! - [`IndexStats`] — Size and memory statistics for a loaded index.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the saga workspace.
///
/// Each variant corresponds to a failure class callers are expected to
/// handle explicitly.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// A named store, file, or record source does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A registry name collides with an existing entry.
    #[error("Duplicate store name: {0}")]
    DuplicateName(String),

    /// A backing file, catalog, or query input could not be decoded into
    /// valid records.
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// A scoring collaborator failed to initialize.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A presentation-layer deadline elapsed before the operation finished.
    /// The underlying blocking call may still run to completion.
    #[error("Timed out after {0}s")]
    TimedOut(u64),

    /// The registry holds no stores to resolve a default from.
    #[error("No stores registered")]
    NoStores,

    /// An outbound HTTP request to a collaborator service failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SagaError`].
pub type SagaResult<T> = Result<T, SagaError>;

// --- Record types ---

/// A single retrievable passage stored in a collection.
///
/// The embedding is produced by an external model before the record reaches
/// the core; all records within one collection share the same embedding
/// dimension. `metadata` is an opaque blob the core hands through untouched —
/// interpreting it is the ingestion and presentation layers' business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Identifier unique within its collection.
    pub id: String,
    /// The passage text.
    pub text: String,
    /// Fixed-dimension embedding vector.
    pub embedding: Vec<f32>,
    /// Opaque metadata blob, never parsed by the core.
    pub metadata: String,
}

impl DocumentRecord {
    /// Creates a record from its four fields.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding,
            metadata: metadata.into(),
        }
    }
}

/// An ordered batch of [`DocumentRecord`]s handed to `merge` by an external
/// ingestion pipeline.
///
/// Ingestion guarantees ids are unique within a batch and embeddings match
/// the target collection's dimension; the index re-validates the dimension
/// on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    records: Vec<DocumentRecord>,
}

impl RecordBatch {
    /// Creates a batch from a vector of records, preserving order.
    pub fn new(records: Vec<DocumentRecord>) -> Self {
        Self { records }
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The set of record ids in the batch.
    pub fn ids(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    /// Iterates the records in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, DocumentRecord> {
        self.records.iter()
    }
}

impl From<Vec<DocumentRecord>> for RecordBatch {
    fn from(records: Vec<DocumentRecord>) -> Self {
        Self::new(records)
    }
}

impl IntoIterator for RecordBatch {
    type Item = DocumentRecord;
    type IntoIter = std::vec::IntoIter<DocumentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordBatch {
    type Item = &'a DocumentRecord;
    type IntoIter = std::slice::Iter<'a, DocumentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// --- Retrieval result types ---

/// One stage-1 search result: a record plus its cosine similarity score.
///
/// A list of hits is always ordered by non-increasing `score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    /// Record identifier.
    pub id: String,
    /// The passage text.
    pub text: String,
    /// Opaque metadata blob.
    pub metadata: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// One final result of two-stage retrieval, carrying both score columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedHit {
    /// Record identifier.
    pub id: String,
    /// The passage text.
    pub text: String,
    /// Opaque metadata blob.
    pub metadata: String,
    /// Stage-1 cosine similarity. Carries no ordering guarantee relative
    /// to the final rank.
    pub embedding_score: f32,
    /// Stage-2 normalized cross-encoder score; non-increasing by rank.
    /// When no reranking ran, this mirrors `embedding_score`.
    pub rerank_score: f32,
}

/// The output of two-stage retrieval: stage-1 candidates, optionally
/// reordered by a cross-encoder pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    /// Final hits, ordered by non-increasing `rerank_score`.
    pub hits: Vec<RerankedHit>,
    /// Whether a stage-2 reranking pass actually ran.
    pub reranked: bool,
    /// Identifier of the scoring method, or `"none"` when disabled.
    pub rerank_method: String,
    /// The stage-1 candidate count requested (`initial_k`).
    pub initial_search_count: usize,
}

impl RerankedResult {
    /// Number of final hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether the result is empty.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

// --- Store catalog types ---

/// Catalog entry describing a registered vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Unique store identifier within the registry.
    pub name: String,
    /// Path to the backing collection file.
    pub path: PathBuf,
    /// UTC timestamp of registration.
    pub created_at: DateTime<Utc>,
    /// Free-form origin tag (e.g. "neptune", "chat", "llama-server").
    pub source_type: String,
    /// Cached record count; may lag behind the backing file.
    pub record_count: usize,
    /// Optional human-readable description.
    #[serde(default)]
    pub description: String,
}

/// Size statistics for a loaded embedding index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of records in the collection.
    pub record_count: usize,
    /// Size of the backing file in bytes.
    pub disk_size: u64,
    /// Size of the in-memory embedding cache in bytes.
    pub cache_size: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_json() {
        let record = DocumentRecord::new(
            "scene-001",
            "The admiral surveyed the bridge.",
            vec![0.1, 0.2, 0.3],
            r#"{"location":"bridge"}"#,
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn record_missing_field_fails_to_parse() {
        // No metadata field: required, not defaulted.
        let json = r#"{"id":"a","text":"t","embedding":[1.0]}"#;
        assert!(serde_json::from_str::<DocumentRecord>(json).is_err());
    }

    #[test]
    fn batch_preserves_order_and_ids() {
        let batch = RecordBatch::new(vec![
            DocumentRecord::new("b", "two", vec![0.0], ""),
            DocumentRecord::new("a", "one", vec![0.0], ""),
        ]);
        assert_eq!(batch.len(), 2);
        let order: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
        assert!(batch.ids().contains("a"));
        assert!(batch.ids().contains("b"));
    }

    #[test]
    fn store_metadata_description_defaults_empty() {
        let json = r#"{
            "name": "s1",
            "path": "/tmp/s1.jsonl",
            "created_at": "2025-11-02T10:00:00Z",
            "source_type": "chat",
            "record_count": 42
        }"#;
        let meta: StoreMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.description, "");
        assert_eq!(meta.record_count, 42);
    }

    #[test]
    fn error_messages_name_the_failure() {
        assert_eq!(
            SagaError::DuplicateName("s1".into()).to_string(),
            "Duplicate store name: s1"
        );
        assert_eq!(SagaError::NoStores.to_string(), "No stores registered");
        assert_eq!(SagaError::TimedOut(30).to_string(), "Timed out after 30s");
    }
}
