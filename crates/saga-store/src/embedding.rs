use std::collections::HashMap;

use saga_core::{SagaError, SagaResult};
use serde::Deserialize;

/// Trait for computing text embeddings (vector representations).
///
/// The core never computes embeddings itself; query vectors and record
/// embeddings both come through this boundary.
pub trait EmbeddingProducer: Send + Sync {
    /// Computes the embedding vector for a single text.
    fn embed(&self, text: &str) -> SagaResult<Vec<f32>>;

    /// Computes embeddings for a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> SagaResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text)?);
        }
        Ok(results)
    }

    /// Dimension of the vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Local bag-of-words embedding producer (no external service needed).
///
/// Hashes words into a fixed-dimension TF vector and L2-normalizes it.
/// Deterministic, so useful for tests and offline setups; replace with a
/// real embedding model endpoint for production-quality recall.
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    /// Creates a producer with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingProducer for HashEmbedding {
    fn embed(&self, text: &str) -> SagaResult<Vec<f32>> {
        if text.is_empty() {
            return Err(SagaError::CorruptData("cannot embed empty text".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1)
            .collect();

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word).or_insert(0.0) += 1.0;
        }

        let total = words.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        // Three hash positions per word for better distribution.
        for (word, count) in &freq {
            let tf = count / total;
            let hash1 = fnv1a(word.as_bytes()) as usize;
            let hash2 = fnv1a(&[word.as_bytes(), &[1u8]].concat()) as usize;
            let hash3 = fnv1a(&[word.as_bytes(), &[2u8]].concat()) as usize;

            vector[hash1 % self.dimension] += tf;
            vector[hash2 % self.dimension] += tf * 0.7;
            vector[hash3 % self.dimension] += tf * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// FNV-1a hash.
fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// Works with llama-server, OpenAI, and any other provider implementing the
/// same request shape. Calls are blocking; the presentation layer dispatches
/// them off its event loop.
pub struct HttpEmbeddingProducer {
    base_url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
    http: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProducer {
    /// Creates a client for `base_url` producing `dimension`-sized vectors
    /// from the named model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            dimension,
            api_key: None,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// Attaches a bearer token to every request. Chainable builder method.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn request(&self, input: serde_json::Value) -> SagaResult<EmbeddingsResponse> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp = request.send().map_err(|e| SagaError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SagaError::Http(format!(
                "embeddings endpoint returned {}",
                resp.status()
            )));
        }
        resp.json::<EmbeddingsResponse>()
            .map_err(|e| SagaError::Http(format!("invalid embeddings response: {e}")))
    }

    fn check_dimension(&self, vector: &[f32]) -> SagaResult<()> {
        if vector.len() != self.dimension {
            return Err(SagaError::CorruptData(format!(
                "embedding service returned dimension {}, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

impl EmbeddingProducer for HttpEmbeddingProducer {
    fn embed(&self, text: &str) -> SagaResult<Vec<f32>> {
        if text.is_empty() {
            return Err(SagaError::CorruptData("cannot embed empty text".to_string()));
        }
        let mut resp = self.request(serde_json::json!(text))?;
        if resp.data.is_empty() {
            return Err(SagaError::Http("embeddings response carried no rows".to_string()));
        }
        let vector = resp.data.remove(0).embedding;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> SagaResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self.request(serde_json::json!(texts))?;
        if resp.data.len() != texts.len() {
            return Err(SagaError::Http(format!(
                "embeddings response carried {} rows for {} inputs",
                resp.data.len(),
                texts.len()
            )));
        }
        let vectors: Vec<Vec<f32>> = resp.data.into_iter().map(|r| r.embedding).collect();
        for vector in &vectors {
            self.check_dimension(vector)?;
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
