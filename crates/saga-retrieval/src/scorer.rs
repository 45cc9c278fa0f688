use saga_core::{SagaError, SagaResult};
use serde::Deserialize;

/// Trait for joint (query, document) relevance scoring.
///
/// Implementations return one raw logit per document, in input order. The
/// core treats the scoring model as an opaque numeric service.
pub trait CrossEncoderScorer: Send + Sync {
    /// Scores each document against the query. Output length and order match
    /// the input documents exactly; no sorting happens here.
    fn score_pairs(&self, query: &str, documents: &[&str]) -> SagaResult<Vec<f32>>;

    /// Identifier of the scoring method, used to tag results.
    fn method(&self) -> &str;
}

/// Client for an OpenAI-style `/v1/rerank` endpoint.
///
/// Works with llama-server's reranking mode and compatible providers: the
/// endpoint takes a query plus a document list and returns one relevance
/// logit per document, keyed by input index.
pub struct HttpCrossEncoderScorer {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankRow>,
}

#[derive(Deserialize)]
struct RerankRow {
    index: usize,
    relevance_score: f32,
}

impl HttpCrossEncoderScorer {
    /// Creates a client for `base_url` scoring with the named model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Attaches a bearer token to every request. Chainable builder method.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

impl CrossEncoderScorer for HttpCrossEncoderScorer {
    fn score_pairs(&self, query: &str, documents: &[&str]) -> SagaResult<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/rerank", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp = request.send().map_err(|e| SagaError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SagaError::Http(format!(
                "rerank endpoint returned {}",
                resp.status()
            )));
        }
        let parsed: RerankResponse = resp
            .json()
            .map_err(|e| SagaError::Http(format!("invalid rerank response: {e}")))?;

        // Responses may arrive sorted by relevance; restore input order.
        let mut scores = vec![0.0f32; documents.len()];
        let mut filled = vec![false; documents.len()];
        for row in parsed.results {
            if row.index >= documents.len() {
                return Err(SagaError::Http(format!(
                    "rerank response index {} out of range for {} documents",
                    row.index,
                    documents.len()
                )));
            }
            scores[row.index] = row.relevance_score;
            filled[row.index] = true;
        }
        if filled.iter().any(|f| !f) {
            return Err(SagaError::Http(format!(
                "rerank response missing scores for some of {} documents",
                documents.len()
            )));
        }
        Ok(scores)
    }

    fn method(&self) -> &str {
        &self.model
    }
}
