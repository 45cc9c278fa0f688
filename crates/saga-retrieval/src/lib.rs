//! Two-stage retrieval: fast embedding recall composed with an optional
//! cross-encoder reranking pass.
//!
//! Stage 1 asks the embedding index for a broad candidate set; stage 2, when
//! a scoring model is available, re-scores each (query, candidate) pair
//! jointly for a finer relevance judgment. If the scoring model fails to
//! initialize, the retriever degrades permanently to embedding-only results
//! for the rest of the process — it never errors repeatedly on a dead model.
//!
//! # Main types
//!
//! - [`CrossEncoderScorer`] — Trait for joint (query, document) scoring.
//! - [`HttpCrossEncoderScorer`] — Client for an OpenAI-style rerank endpoint.
//! - [`RerankAdapter`] — Batched, order-preserving scoring plus normalization.
//! - [`TwoStageRetriever`] — The orchestrator owning the fallback state.
//! - [`RerankState`] — Explicit `Enabled` / `Disabled` availability type.

/// Batched scoring adapter and score normalization.
pub mod adapter;
/// The two-stage retrieval orchestrator.
pub mod engine;
/// Cross-encoder scorer trait and HTTP implementation.
pub mod scorer;

pub use adapter::{normalize, RerankAdapter};
pub use engine::{RerankState, TwoStageRetriever};
pub use scorer::{CrossEncoderScorer, HttpCrossEncoderScorer};
