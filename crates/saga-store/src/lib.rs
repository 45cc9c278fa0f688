//! Embedding index with exact cosine similarity search.
//!
//! Provides a file-backed passage collection with a dense in-memory embedding
//! cache, linear-scan cosine ranking, id-deduplicated merging with atomic
//! persistence, and the embedding producer boundary used to turn query text
//! into vectors.
//!
//! # Main types
//!
//! - [`EmbeddingIndex`] — A loaded collection answering similarity queries.
//! - [`EmbeddingProducer`] — Trait for computing text embeddings.
//! - [`HashEmbedding`] — Deterministic local producer (no external service).
//! - [`HttpEmbeddingProducer`] — Client for an OpenAI-compatible embeddings endpoint.

/// Embedding producer trait and implementations.
pub mod embedding;
/// The file-backed embedding index.
pub mod index;

pub use embedding::{EmbeddingProducer, HashEmbedding, HttpEmbeddingProducer};
pub use index::EmbeddingIndex;
