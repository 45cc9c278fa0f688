//! Result formatting, query validation, and metadata-based display filters.
//!
//! Everything here interprets metadata blobs and scores for the terminal;
//! none of it lives in the core, which hands metadata through unparsed.

use saga_core::{RerankedHit, RerankedResult, StoreMetadata};

/// Minimum query length accepted by the search commands.
pub const MIN_QUERY_LEN: usize = 3;

/// Strips and validates a search query; too-short queries are rejected
/// before any core call happens.
pub fn format_search_query(query: &str) -> Result<String, String> {
    let formatted = query.trim();
    if formatted.len() < MIN_QUERY_LEN {
        return Err(format!("query must be at least {MIN_QUERY_LEN} characters"));
    }
    Ok(formatted.to_string())
}

/// Formats a `[0, 1]` score as a whole percentage, clamping out-of-range
/// values.
pub fn format_relevance_score(score: f32) -> String {
    let clamped = score.clamp(0.0, 1.0);
    format!("{}%", (clamped * 100.0) as u32)
}

/// Truncates text for preview display, appending `[...]` when shortened.
pub fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_length.saturating_sub(5)).collect();
    format!("{cut}[...]")
}

/// Keeps only hits whose metadata matches the given location and character
/// filters (case-insensitive substring match). Hits with unparseable
/// metadata never match an active filter.
pub fn apply_filters(
    hits: Vec<RerankedHit>,
    location: Option<&str>,
    character: Option<&str>,
) -> Vec<RerankedHit> {
    hits.into_iter()
        .filter(|hit| {
            let location_ok = match location {
                Some(needle) => metadata_field_contains(&hit.metadata, "location", needle),
                None => true,
            };
            let character_ok = match character {
                Some(needle) => metadata_characters_contain(&hit.metadata, needle),
                None => true,
            };
            location_ok && character_ok
        })
        .collect()
}

/// Case-insensitive substring match against a string field of the metadata
/// JSON object.
fn metadata_field_contains(metadata: &str, field: &str, needle: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(metadata) else {
        return false;
    };
    value
        .get(field)
        .and_then(|v| v.as_str())
        .is_some_and(|s| s.to_lowercase().contains(&needle.to_lowercase()))
}

/// Matches against the `characters_present` list, which ingestion stores
/// either as a JSON array or as a JSON-encoded string of one.
fn metadata_characters_contain(metadata: &str, needle: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(metadata) else {
        return false;
    };
    let Some(field) = value.get("characters_present") else {
        return false;
    };
    let needle = needle.to_lowercase();
    let names: Vec<String> = match field {
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        serde_json::Value::String(inner) => serde_json::from_str::<Vec<String>>(inner)
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    names.iter().any(|name| name.to_lowercase().contains(&needle))
}

/// Pulls a short "location · date" summary out of a metadata blob for the
/// result listing; empty when the blob is not a JSON object.
pub fn metadata_summary(metadata: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(metadata) else {
        return String::new();
    };
    let mut parts = Vec::new();
    if let Some(location) = value.get("location").and_then(|v| v.as_str()) {
        parts.push(location.to_string());
    }
    if let Some(date) = value.get("date_iso").and_then(|v| v.as_str()) {
        parts.push(date.chars().take(10).collect());
    }
    parts.join(" · ")
}

/// Renders a search result for the terminal.
pub fn render_results(result: &RerankedResult, query: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("Search: '{query}'\n"));
    if result.reranked {
        out.push_str(&format!("Reranked with {}\n", result.rerank_method));
    } else {
        out.push_str("Embedding-only ranking (reranker unavailable)\n");
    }

    if result.hits.is_empty() {
        out.push_str("\nNo results.\n");
        return out;
    }

    for (i, hit) in result.hits.iter().enumerate() {
        out.push_str(&format!(
            "\n[{}] {}  relevance {}",
            i + 1,
            hit.id,
            format_relevance_score(hit.rerank_score)
        ));
        if result.reranked {
            out.push_str(&format!(
                "  (embedding {})",
                format_relevance_score(hit.embedding_score)
            ));
        }
        out.push('\n');
        let summary = metadata_summary(&hit.metadata);
        if !summary.is_empty() {
            out.push_str(&format!("    {summary}\n"));
        }
        out.push_str(&format!("    {}\n", truncate_text(&hit.text, 200)));
    }
    out
}

/// Renders the registered-stores table, marking the default store.
pub fn render_store_table(stores: &[StoreMetadata], default: Option<&str>) -> String {
    if stores.is_empty() {
        return "No stores registered.\nRegister one with: saga stores register <name> <path> --source-type <type>\n"
            .to_string();
    }

    let name_width = stores.iter().map(|s| s.name.len()).max().unwrap_or(4) + 2;
    let type_width = stores.iter().map(|s| s.source_type.len()).max().unwrap_or(4) + 2;

    let mut out = String::new();
    for store in stores {
        let marker = if default == Some(store.name.as_str()) { "*" } else { " " };
        out.push_str(&format!(
            "{marker} {:<name_width$} {:<type_width$} {:>8} records  {}  {}\n",
            store.name,
            store.source_type,
            store.record_count,
            store.created_at.format("%Y-%m-%d"),
            truncate_text(&store.description, 40),
        ));
    }
    if let Some(name) = default {
        out.push_str(&format!("\nDefault: {name}\n"));
    }
    out
}
