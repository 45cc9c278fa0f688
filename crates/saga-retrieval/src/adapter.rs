use saga_core::{SagaError, SagaResult};

use crate::scorer::CrossEncoderScorer;

/// Default number of (query, document) pairs scored per collaborator call.
const DEFAULT_BATCH_SIZE: usize = 32;

/// Batched, order-preserving wrapper around a [`CrossEncoderScorer`].
///
/// The adapter chunks document lists to bound the collaborator's working set
/// and concatenates the chunk scores back in input order. It holds no ranking
/// state; ordering decisions belong to the orchestrator.
pub struct RerankAdapter {
    scorer: Box<dyn CrossEncoderScorer>,
    batch_size: usize,
}

impl RerankAdapter {
    /// Wraps a scorer with the default batch size.
    pub fn new(scorer: Box<dyn CrossEncoderScorer>) -> Self {
        Self {
            scorer,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the scoring batch size (minimum 1). Chainable builder method.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Identifier of the underlying scoring method.
    pub fn method(&self) -> &str {
        self.scorer.method()
    }

    /// Scores every document against the query, batching the collaborator
    /// calls. Output order matches input order; nothing is sorted here.
    pub fn score(&self, query: &str, documents: &[&str]) -> SagaResult<Vec<f32>> {
        let mut scores = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(self.batch_size) {
            let chunk_scores = self.scorer.score_pairs(query, chunk)?;
            if chunk_scores.len() != chunk.len() {
                return Err(SagaError::Http(format!(
                    "scorer returned {} scores for {} documents",
                    chunk_scores.len(),
                    chunk.len()
                )));
            }
            scores.extend(chunk_scores);
        }
        Ok(scores)
    }
}

/// Maps raw logits into `(0, 1)` with the logistic transform
/// `1 / (1 + e^-x)`, making scores comparable across queries.
pub fn normalize(raw_scores: &[f32]) -> Vec<f32> {
    raw_scores.iter().map(|x| 1.0 / (1.0 + (-x).exp())).collect()
}
