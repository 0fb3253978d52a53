//! `memo search` — hybrid retrieval with source-aware rendering.

use anyhow::Result;
use chrono::TimeZone;

use crate::config::MemoConfig;
use crate::error::MemoError;
use crate::memory::search::{self, SearchHit, SearchRequest};
use crate::memory::types::DOC_CHUNK_TYPE;

#[allow(clippy::too_many_arguments)]
pub async fn search(
    config: &MemoConfig,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f64>,
    container: Option<&str>,
    skip_vector: bool,
    skip_full_text: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        return Err(MemoError::InvalidInput("search query must not be empty".into()).into());
    }
    if skip_vector && skip_full_text {
        return Err(MemoError::InvalidInput(
            "--skip-vector and --skip-full-text together leave nothing to search".into(),
        )
        .into());
    }
    let limit = limit.unwrap_or(config.max_memories);
    if limit == 0 {
        return Err(MemoError::InvalidInput("--limit must be at least 1".into()).into());
    }
    let threshold = threshold.unwrap_or(config.similarity_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(
            MemoError::InvalidInput("--threshold must be between 0 and 1".into()).into(),
        );
    }

    let cwd = std::env::current_dir()?;
    let container_tag = super::resolve_container(container, &cwd)?;
    let store = super::open_project_store(config, &cwd)?;

    let vector = if skip_vector {
        None
    } else {
        let embedder = crate::embedding::Embedder::lazy(config);
        Some(embedder.embed(&store, query).await?)
    };

    let request = SearchRequest {
        vector: vector.as_deref(),
        text: if skip_full_text { None } else { Some(query) },
        container_tag: Some(container_tag.as_str()),
        limit,
        threshold,
        min_vector_similarity: config.min_vector_similarity,
    };

    let hits = search::search(&store, &request)?;

    if hits.is_empty() {
        println!("No results.");
    } else {
        for hit in &hits {
            render_hit(hit);
        }
    }

    store.close()?;
    Ok(())
}

fn render_hit(hit: &SearchHit) {
    println!(
        "{:.3} ({}) {}",
        hit.similarity,
        hit.id,
        format_date(hit.created_at)
    );
    if let Some(location) = chunk_location(hit) {
        println!("{location}");
    }
    println!("{}", hit.content);
    println!();
}

/// `sourcePath:startLine-endLine` for markdown chunks; repo-map records and
/// user memories have no line range.
fn chunk_location(hit: &SearchHit) -> Option<String> {
    if hit.record_type.as_deref() != Some(DOC_CHUNK_TYPE) {
        return None;
    }
    let meta: serde_json::Value = serde_json::from_str(hit.metadata.as_deref()?).ok()?;
    if meta.get("importType").and_then(|v| v.as_str()) == Some("repo-map") {
        return None;
    }
    let source = meta.get("sourcePath")?.as_str()?;
    let start = meta.get("startLine")?.as_u64()?;
    let end = meta.get("endLine")?.as_u64()?;
    Some(format!("{source}:{start}-{end}"))
}

fn format_date(millis: i64) -> String {
    match chrono::Utc.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d").to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(record_type: Option<&str>, metadata: Option<&str>) -> SearchHit {
        SearchHit {
            id: "mem_1700000000000_abc123def".into(),
            content: "content".into(),
            similarity: 0.9,
            created_at: 1_700_000_000_000,
            record_type: record_type.map(str::to_string),
            metadata: metadata.map(str::to_string),
        }
    }

    #[test]
    fn date_renders_iso() {
        // 2023-11-14T22:13:20Z
        assert_eq!(format_date(1_700_000_000_000), "2023-11-14");
    }

    #[test]
    fn user_memories_have_no_location_line() {
        assert!(chunk_location(&hit(None, None)).is_none());
    }

    #[test]
    fn markdown_chunks_render_a_location() {
        let meta = r#"{"sourcePath":"/p/notes.md","sourceKey":"/p/notes.md",
            "startLine":10,"endLine":24,"chunkIndex":1,"chunkCount":3,"chunkHash":"x"}"#;
        assert_eq!(
            chunk_location(&hit(Some(DOC_CHUNK_TYPE), Some(meta))).as_deref(),
            Some("/p/notes.md:10-24")
        );
    }

    #[test]
    fn repo_map_chunks_render_no_location() {
        let meta = r#"{"sourcePath":"src/main.rs","sourceKey":"repo-map:/p/map.json",
            "language":"rust","symbols":[],"importType":"repo-map"}"#;
        assert!(chunk_location(&hit(Some(DOC_CHUNK_TYPE), Some(meta))).is_none());
    }
}
