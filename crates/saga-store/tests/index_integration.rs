#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the saga-store crate.
//!
//! Covers load/query/merge round-trips against real files, merge semantics
//! under conflicts, generation isolation, and producer-driven search.

use std::collections::BTreeSet;
use std::fs;

use tempfile::TempDir;

use saga_core::{DocumentRecord, RecordBatch};
use saga_store::{EmbeddingIndex, EmbeddingProducer, HashEmbedding};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn record(id: &str, text: &str, embedding: Vec<f32>) -> DocumentRecord {
    DocumentRecord::new(id, text, embedding, r#"{"location":"bridge"}"#)
}

fn write_collection(dir: &TempDir, name: &str, records: &[DocumentRecord]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut data = String::new();
    for r in records {
        data.push_str(&serde_json::to_string(r).unwrap());
        data.push('\n');
    }
    fs::write(&path, data).unwrap();
    path
}

// ---------------------------------------------------------------------------
// 1. Merge round-trip through disk
// ---------------------------------------------------------------------------

#[test]
fn merge_then_reload_yields_id_union() {
    let dir = TempDir::new().unwrap();
    let path = write_collection(
        &dir,
        "scenes.jsonl",
        &[
            record("s1", "one", vec![1.0, 0.0]),
            record("s2", "two", vec![0.0, 1.0]),
        ],
    );
    let index = EmbeddingIndex::load(&path).unwrap();

    let batch = RecordBatch::new(vec![
        record("s2", "conflicting two", vec![0.5, 0.5]),
        record("s3", "three", vec![0.7, 0.7]),
    ]);
    index.merge(batch).unwrap();

    let reloaded = EmbeddingIndex::load(&path).unwrap();
    let ids: BTreeSet<&str> = reloaded.records().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, BTreeSet::from(["s1", "s2", "s3"]));

    // The conflicting record kept its original content.
    let s2 = reloaded.records().iter().find(|r| r.id == "s2").unwrap();
    assert_eq!(s2.text, "two");
    assert_eq!(s2.embedding, vec![0.0, 1.0]);
}

#[test]
fn duplicate_only_merge_is_idempotent_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = write_collection(
        &dir,
        "scenes.jsonl",
        &[record("s1", "one", vec![1.0, 0.0])],
    );
    let before = fs::read_to_string(&path).unwrap();

    let index = EmbeddingIndex::load(&path).unwrap();
    index
        .merge(RecordBatch::new(vec![record("s1", "rewrite", vec![0.2, 0.8])]))
        .unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn merge_returns_queryable_new_generation() {
    let dir = TempDir::new().unwrap();
    let path = write_collection(
        &dir,
        "scenes.jsonl",
        &[record("s1", "one", vec![1.0, 0.0])],
    );
    let index = EmbeddingIndex::load(&path).unwrap();
    let merged = index
        .merge(RecordBatch::new(vec![record("s2", "two", vec![0.0, 1.0])]))
        .unwrap();

    // New generation sees the appended record...
    let hits = merged.query(&[0.0, 1.0], 1).unwrap();
    assert_eq!(hits[0].id, "s2");
    // ...while the old handle still answers from its own cache.
    let old_hits = index.query(&[0.0, 1.0], 5).unwrap();
    assert_eq!(old_hits.len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Producer-driven search
// ---------------------------------------------------------------------------

#[test]
fn hash_embedded_corpus_ranks_related_text_first() {
    let dir = TempDir::new().unwrap();
    let embedder = HashEmbedding::default();

    let texts = [
        ("fleet", "the admiral commanded the fleet from the bridge"),
        ("dinner", "a quiet dinner in the lower decks galley"),
        ("battle", "the fleet engaged in battle near the outer moons"),
    ];
    let records: Vec<DocumentRecord> = texts
        .iter()
        .map(|(id, text)| DocumentRecord::new(*id, *text, embedder.embed(text).unwrap(), "{}"))
        .collect();
    let path = write_collection(&dir, "scenes.jsonl", &records);

    let index = EmbeddingIndex::load(&path).unwrap();
    let query_vector = embedder.embed("admiral fleet command").unwrap();
    let hits = index.query(&query_vector, 3).unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, "fleet", "closest passage should rank first");
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

// ---------------------------------------------------------------------------
// 3. Corruption handling
// ---------------------------------------------------------------------------

#[test]
fn trailing_garbage_line_fails_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scenes.jsonl");
    let good = serde_json::to_string(&record("s1", "one", vec![1.0, 0.0])).unwrap();
    fs::write(&path, format!("{good}\nnot a record\n")).unwrap();

    assert!(EmbeddingIndex::load(&path).is_err());
}
