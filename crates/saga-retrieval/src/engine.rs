use saga_core::{RerankedHit, RerankedResult, RetrievalHit, SagaResult};
use saga_store::EmbeddingIndex;
use tracing::{debug, warn};

use crate::adapter::{normalize, RerankAdapter};

/// Tag attached to results when no reranking pass ran.
const METHOD_NONE: &str = "none";

/// Availability of the reranking pass.
///
/// Every call site matches both variants; there is no nullable adapter
/// handle to drift out of sync with a boolean flag.
pub enum RerankState {
    /// The scoring model initialized; stage 2 runs on every retrieval.
    Enabled(RerankAdapter),
    /// Initialization failed; stage 2 is skipped for the process lifetime.
    Disabled {
        /// Why the scoring model is unavailable.
        reason: String,
    },
}

/// The two-stage retrieval orchestrator.
///
/// Composes an [`EmbeddingIndex`] with a [`RerankAdapter`]. If adapter
/// initialization fails the retriever enters `Disabled` once and stays there
/// — subsequent retrievals succeed with embedding-only ranking instead of
/// erroring repeatedly against a model that will not come back. There is no
/// recovery path within a process lifetime; restart to retry initialization.
pub struct TwoStageRetriever {
    state: RerankState,
}

impl TwoStageRetriever {
    /// Builds a retriever from an adapter initialization result.
    ///
    /// An `Err` becomes the permanent `Disabled` state, logged once here.
    pub fn new(init: SagaResult<RerankAdapter>) -> Self {
        match init {
            Ok(adapter) => Self::with_adapter(adapter),
            Err(e) => {
                warn!(error = %e, "Reranker init failed, falling back to embedding-only search");
                Self::disabled(e.to_string())
            }
        }
    }

    /// Builds a retriever with a working adapter.
    pub fn with_adapter(adapter: RerankAdapter) -> Self {
        Self {
            state: RerankState::Enabled(adapter),
        }
    }

    /// Builds a retriever that never reranks, recording why.
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            state: RerankState::Disabled {
                reason: reason.into(),
            },
        }
    }

    /// The current availability state.
    pub fn state(&self) -> &RerankState {
        &self.state
    }

    /// Whether the reranking pass is available.
    pub fn is_enabled(&self) -> bool {
        matches!(self.state, RerankState::Enabled(_))
    }

    /// The active scoring method name, or `"none"` when disabled.
    pub fn rerank_method(&self) -> &str {
        match &self.state {
            RerankState::Enabled(adapter) => adapter.method(),
            RerankState::Disabled { .. } => METHOD_NONE,
        }
    }

    /// Two-stage retrieval.
    ///
    /// Stage 1 takes the top `initial_k` candidates by embedding similarity.
    /// When reranking is enabled, stage 2 scores every candidate jointly with
    /// the query, re-sorts by normalized score, and truncates to `final_k`
    /// (or fewer when the candidate set is smaller — never an error). When
    /// disabled, the stage-1 candidates are returned verbatim. A scorer
    /// failure on an enabled retriever propagates as an error; it does not
    /// change the state.
    pub fn retrieve(
        &self,
        index: &EmbeddingIndex,
        query_text: &str,
        query_vector: &[f32],
        initial_k: usize,
        final_k: usize,
    ) -> SagaResult<RerankedResult> {
        let candidates = index.query(query_vector, initial_k)?;
        debug!(candidates = candidates.len(), initial_k, "Stage 1 complete");

        let adapter = match &self.state {
            RerankState::Disabled { reason } => {
                debug!(reason = %reason, "Rerank disabled, returning stage-1 order");
                return Ok(passthrough(candidates, initial_k));
            }
            RerankState::Enabled(adapter) => adapter,
        };

        let texts: Vec<&str> = candidates.iter().map(|h| h.text.as_str()).collect();
        let raw = adapter.score(query_text, &texts)?;
        let scores = normalize(&raw);

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        // Stable sort: tied rerank scores keep stage-1 order.
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(final_k);

        let hits = order
            .into_iter()
            .map(|i| {
                let hit = &candidates[i];
                RerankedHit {
                    id: hit.id.clone(),
                    text: hit.text.clone(),
                    metadata: hit.metadata.clone(),
                    embedding_score: hit.score,
                    rerank_score: scores[i],
                }
            })
            .collect();

        Ok(RerankedResult {
            hits,
            reranked: true,
            rerank_method: adapter.method().to_string(),
            initial_search_count: initial_k,
        })
    }
}

/// Wraps stage-1 hits unchanged; `rerank_score` mirrors the embedding score
/// so the non-increasing-by-rank invariant holds without a reranking pass.
fn passthrough(candidates: Vec<RetrievalHit>, initial_k: usize) -> RerankedResult {
    let hits = candidates
        .into_iter()
        .map(|hit| RerankedHit {
            id: hit.id,
            text: hit.text,
            metadata: hit.metadata,
            embedding_score: hit.score,
            rerank_score: hit.score,
        })
        .collect();
    RerankedResult {
        hits,
        reranked: false,
        rerank_method: METHOD_NONE.to_string(),
        initial_search_count: initial_k,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::scorer::CrossEncoderScorer;
    use saga_core::{DocumentRecord, SagaError};
    use std::fs;
    use tempfile::TempDir;

    /// Scores each document by how late it appears in a fixed preference
    /// list, so reranking inverts or reshuffles stage-1 order on demand.
    struct PreferenceScorer {
        preference: Vec<&'static str>,
    }

    impl CrossEncoderScorer for PreferenceScorer {
        fn score_pairs(&self, _query: &str, documents: &[&str]) -> SagaResult<Vec<f32>> {
            Ok(documents
                .iter()
                .map(|doc| {
                    self.preference
                        .iter()
                        .position(|p| doc.contains(*p))
                        .map_or(-5.0, |rank| 5.0 - rank as f32)
                })
                .collect())
        }

        fn method(&self) -> &str {
            "preference"
        }
    }

    struct FailingScorer;

    impl CrossEncoderScorer for FailingScorer {
        fn score_pairs(&self, _query: &str, _documents: &[&str]) -> SagaResult<Vec<f32>> {
            Err(SagaError::Http("scorer exploded".to_string()))
        }

        fn method(&self) -> &str {
            "failing"
        }
    }

    fn seed_index(dir: &TempDir) -> EmbeddingIndex {
        let records = [
            DocumentRecord::new("A", "alpha passage", vec![1.0, 0.0], "{}"),
            DocumentRecord::new("B", "bravo passage", vec![0.9, 0.1], "{}"),
            DocumentRecord::new("C", "charlie passage", vec![0.7, 0.7], "{}"),
            DocumentRecord::new("D", "delta passage", vec![0.0, 1.0], "{}"),
        ];
        let path = dir.path().join("scenes.jsonl");
        let mut data = String::new();
        for r in &records {
            data.push_str(&serde_json::to_string(r).unwrap());
            data.push('\n');
        }
        fs::write(&path, data).unwrap();
        EmbeddingIndex::load(&path).unwrap()
    }

    #[test]
    fn disabled_returns_stage_one_order_verbatim() {
        let dir = TempDir::new().unwrap();
        let index = seed_index(&dir);
        let retriever = TwoStageRetriever::disabled("no model on this host");

        let direct = index.query(&[1.0, 0.0], 3).unwrap();
        let result = retriever
            .retrieve(&index, "alpha", &[1.0, 0.0], 3, 2)
            .unwrap();

        assert!(!result.reranked);
        assert_eq!(result.rerank_method, "none");
        // Verbatim: same ids, same order, not truncated to final_k.
        let direct_ids: Vec<&str> = direct.iter().map(|h| h.id.as_str()).collect();
        let result_ids: Vec<&str> = result.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(result_ids, direct_ids);
        for hit in &result.hits {
            assert_eq!(hit.rerank_score, hit.embedding_score);
        }
    }

    #[test]
    fn init_failure_becomes_permanent_disabled_state() {
        let retriever =
            TwoStageRetriever::new(Err(SagaError::Unavailable("model load failed".to_string())));
        assert!(!retriever.is_enabled());
        assert_eq!(retriever.rerank_method(), "none");
        match retriever.state() {
            RerankState::Disabled { reason } => {
                assert!(reason.contains("model load failed"));
            }
            RerankState::Enabled(_) => panic!("expected disabled state"),
        }
    }

    #[test]
    fn enabled_reorders_by_rerank_score_and_truncates() {
        let dir = TempDir::new().unwrap();
        let index = seed_index(&dir);
        // The cross-encoder prefers delta, then charlie — the reverse of
        // what embedding similarity to [1, 0] says.
        let adapter = RerankAdapter::new(Box::new(PreferenceScorer {
            preference: vec!["delta", "charlie", "bravo", "alpha"],
        }));
        let retriever = TwoStageRetriever::with_adapter(adapter);

        let result = retriever
            .retrieve(&index, "night watch", &[1.0, 0.0], 4, 2)
            .unwrap();

        assert!(result.reranked);
        assert_eq!(result.rerank_method, "preference");
        assert_eq!(result.initial_search_count, 4);
        assert_eq!(result.len(), 2);
        assert_eq!(result.hits[0].id, "D");
        assert_eq!(result.hits[1].id, "C");
        // rerank_score is non-increasing by rank.
        assert!(result.hits[0].rerank_score >= result.hits[1].rerank_score);
        // Both score columns travel with each hit.
        assert!((result.hits[0].embedding_score - 0.0).abs() < 1e-5);
    }

    #[test]
    fn final_k_exceeding_candidates_returns_all() {
        let dir = TempDir::new().unwrap();
        let index = seed_index(&dir);
        let adapter = RerankAdapter::new(Box::new(PreferenceScorer {
            preference: vec!["alpha", "bravo", "charlie", "delta"],
        }));
        let retriever = TwoStageRetriever::with_adapter(adapter);

        let result = retriever
            .retrieve(&index, "anything", &[1.0, 0.0], 3, 10)
            .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn scorer_failure_propagates_without_state_flip() {
        let dir = TempDir::new().unwrap();
        let index = seed_index(&dir);
        let retriever =
            TwoStageRetriever::with_adapter(RerankAdapter::new(Box::new(FailingScorer)));

        let err = retriever
            .retrieve(&index, "anything", &[1.0, 0.0], 2, 2)
            .unwrap_err();
        assert!(matches!(err, SagaError::Http(_)));
        // A per-call failure is not a fallback transition.
        assert!(retriever.is_enabled());
    }

    #[test]
    fn empty_candidate_set_yields_empty_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.jsonl");
        fs::write(&path, "").unwrap();
        let index = EmbeddingIndex::load(&path).unwrap();
        let adapter = RerankAdapter::new(Box::new(PreferenceScorer { preference: vec![] }));
        let retriever = TwoStageRetriever::with_adapter(adapter);

        let result = retriever.retrieve(&index, "q", &[1.0, 0.0], 5, 5).unwrap();
        assert!(result.is_empty());
        assert!(result.reranked);
    }
}
