use std::fs;
use std::path::{Path, PathBuf};

use saga_core::{DocumentRecord, IndexStats, RecordBatch, RetrievalHit, SagaError, SagaResult};
use tracing::{debug, info};

/// A loaded passage collection with a dense embedding cache.
///
/// The cache holds one L2-normalized row per record, in lock-step with record
/// order, so a query is a single normalized dot product per row. A loaded
/// index is immutable: [`merge`](EmbeddingIndex::merge) builds and returns a
/// new generation and never touches the receiver, so concurrent readers of an
/// existing handle are always safe.
#[derive(Debug)]
pub struct EmbeddingIndex {
    path: PathBuf,
    records: Vec<DocumentRecord>,
    /// Row-major normalized embeddings, `records.len() * dimension` floats.
    cache: Vec<f32>,
    dimension: usize,
}

impl EmbeddingIndex {
    /// Loads a collection file and builds the embedding cache.
    ///
    /// The backing file is JSON Lines, one [`DocumentRecord`] per line. The
    /// collection dimension is fixed by the first record; any row with a
    /// different embedding length or a missing required field fails with
    /// [`SagaError::CorruptData`]. A missing file fails with
    /// [`SagaError::NotFound`].
    pub fn load(path: impl AsRef<Path>) -> SagaResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(SagaError::NotFound(format!(
                "collection file not found: {}",
                path.display()
            )));
        }

        let data = fs::read_to_string(&path)?;
        let mut records = Vec::new();
        let mut dimension = 0usize;

        for (lineno, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: DocumentRecord = serde_json::from_str(line).map_err(|e| {
                SagaError::CorruptData(format!(
                    "invalid record on line {} of {}: {}",
                    lineno + 1,
                    path.display(),
                    e
                ))
            })?;
            if records.is_empty() {
                dimension = record.embedding.len();
            } else if record.embedding.len() != dimension {
                return Err(SagaError::CorruptData(format!(
                    "record '{}' has embedding dimension {}, collection dimension is {}",
                    record.id,
                    record.embedding.len(),
                    dimension
                )));
            }
            records.push(record);
        }

        let cache = build_cache(&records, dimension);
        info!(
            records = records.len(),
            dimension,
            path = %path.display(),
            "Loaded collection"
        );

        Ok(Self {
            path,
            records,
            cache,
            dimension,
        })
    }

    /// Ranks every record by cosine similarity to `query_vector` and returns
    /// the top `k` hits in non-increasing score order.
    ///
    /// Ties keep insertion order (stable sort). `k` larger than the record
    /// count returns every record. A record with a zero-norm embedding scores
    /// `0` against any query; so does every record when the query itself has
    /// zero norm.
    pub fn query(&self, query_vector: &[f32], k: usize) -> SagaResult<Vec<RetrievalHit>> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query_vector.len() != self.dimension {
            return Err(SagaError::CorruptData(format!(
                "query embedding has dimension {}, collection dimension is {}",
                query_vector.len(),
                self.dimension
            )));
        }

        let query = l2_normalize(query_vector);
        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let row = &self.cache[i * self.dimension..(i + 1) * self.dimension];
                (i, dot(row, &query))
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let record = &self.records[i];
                RetrievalHit {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                    score,
                }
            })
            .collect())
    }

    /// Merges a batch into the collection and returns the new generation.
    ///
    /// Records whose id already exists are dropped — the existing record
    /// wins. Non-conflicting records are appended in their batch order. The
    /// merged collection is written to a sibling temp file and atomically
    /// renamed over the backing file before the new index is returned; the
    /// receiver is left untouched.
    pub fn merge(&self, batch: RecordBatch) -> SagaResult<EmbeddingIndex> {
        let mut dimension = self.dimension;
        let mut merged = self.records.clone();
        let mut seen: std::collections::HashSet<String> =
            merged.iter().map(|r| r.id.clone()).collect();
        let mut skipped = 0usize;

        for record in batch {
            if dimension == 0 {
                // First record of an empty collection fixes the dimension.
                dimension = record.embedding.len();
            } else if record.embedding.len() != dimension {
                return Err(SagaError::CorruptData(format!(
                    "incoming record '{}' has embedding dimension {}, collection dimension is {}",
                    record.id,
                    record.embedding.len(),
                    dimension
                )));
            }
            if seen.contains(&record.id) {
                debug!(id = %record.id, "Skipping duplicate id in merge");
                skipped += 1;
                continue;
            }
            seen.insert(record.id.clone());
            merged.push(record);
        }

        write_records_atomic(&self.path, &merged)?;
        let cache = build_cache(&merged, dimension);
        info!(
            added = merged.len() - self.records.len(),
            skipped,
            total = merged.len(),
            path = %self.path.display(),
            "Merged batch into collection"
        );

        Ok(EmbeddingIndex {
            path: self.path.clone(),
            records: merged,
            cache,
            dimension,
        })
    }

    /// Record count, backing-file size, and embedding cache size.
    pub fn stats(&self) -> SagaResult<IndexStats> {
        let disk_size = fs::metadata(&self.path)?.len();
        Ok(IndexStats {
            record_count: self.records.len(),
            disk_size,
            cache_size: (self.cache.len() * std::mem::size_of::<f32>()) as u64,
        })
    }

    /// The records in insertion order.
    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    /// Number of records in the collection.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The collection's embedding dimension (`0` for an empty collection).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Path of the backing collection file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds the dense normalized cache for a record slice.
fn build_cache(records: &[DocumentRecord], dimension: usize) -> Vec<f32> {
    let mut cache = Vec::with_capacity(records.len() * dimension);
    for record in records {
        cache.extend(l2_normalize(&record.embedding));
    }
    cache
}

/// L2-normalizes a vector; a zero-norm vector maps to all zeros so its
/// similarity against anything is exactly `0`.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vec![0.0; v.len()]
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Serializes records as JSON Lines into a sibling temp file, then renames
/// it over `path` so readers never observe a half-written collection.
fn write_records_atomic(path: &Path, records: &[DocumentRecord]) -> SagaResult<()> {
    let mut data = String::new();
    for record in records {
        data.push_str(&serde_json::to_string(record)?);
        data.push('\n');
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
