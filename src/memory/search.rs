//! Hybrid retrieval — gated KNN + BM25 fused with Reciprocal Rank Fusion.
//!
//! The vector list is gated on a minimum cosine similarity before fusion
//! because the KNN virtual table always returns `k` rows no matter how far
//! away they are. Scores are normalised per-record: results found by both
//! subsystems (or by BM25 alone) report a rank-derived RRF score, while
//! vector-only results report their raw cosine similarity, which preserves
//! score spread instead of collapsing to a constant floor.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rusqlite::params;

use crate::error::MemoError;
use crate::memory::store::Store;
use crate::memory::vector_to_bytes;

/// RRF constant: contribution of rank `r` is `1 / (RRF_K + r)`.
pub const RRF_K: f64 = 60.0;

/// Candidate pool multiplier — each subsystem is asked for `4 * limit`.
const CANDIDATE_FACTOR: usize = 4;

/// KNN width used by the dedup helper.
const DEDUP_KNN_K: usize = 5;

/// One search query. At least one of `vector` / `text` must be present.
pub struct SearchRequest<'a> {
    /// Unit-length query embedding (already prefixed and embedded).
    pub vector: Option<&'a [f32]>,
    /// Raw query text for BM25.
    pub text: Option<&'a str>,
    /// Restrict results to one container; `None` searches everything.
    pub container_tag: Option<&'a str>,
    pub limit: usize,
    /// Final cutoff on reported similarity.
    pub threshold: f64,
    /// Stage-1 gate on cosine similarity.
    pub min_vector_similarity: f64,
}

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub similarity: f64,
    pub created_at: i64,
    pub record_type: Option<String>,
    pub metadata: Option<String>,
}

/// A near-duplicate candidate returned by [`find_near_duplicates`].
#[derive(Debug, Clone)]
pub struct NearDuplicate {
    pub id: String,
    pub similarity: f64,
}

/// Execute the full hybrid pipeline.
pub fn search(store: &Store, request: &SearchRequest<'_>) -> Result<Vec<SearchHit>> {
    if request.vector.is_none() && request.text.is_none() {
        return Err(MemoError::InvalidInput(
            "search needs a query vector, query text, or both".into(),
        )
        .into());
    }

    let candidate_limit = CANDIDATE_FACTOR * request.limit.max(1);

    // Stage 1: gated KNN. rank in the survivors list + raw cosine similarity.
    let vector_list: Vec<(String, f64)> = match request.vector {
        Some(vector) => {
            let raw = knn(store, vector, candidate_limit)?;
            raw.into_iter()
                .map(|(id, distance)| (id, 1.0 - distance))
                .filter(|(_, similarity)| *similarity >= request.min_vector_similarity)
                .collect()
        }
        None => Vec::new(),
    };

    // Stage 2: BM25, best rank first. Grammar errors degrade to vector-only.
    let fts_list = match request.text {
        Some(text) => {
            match fts_match(store, text, request.container_tag, candidate_limit) {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::warn!(error = %e, "full-text query failed, falling back to vector-only");
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    // Stage 3: RRF over both lists.
    let mut rrf: HashMap<&str, f64> = HashMap::new();
    let mut vector_similarity: HashMap<&str, f64> = HashMap::new();
    for (rank, (id, similarity)) in vector_list.iter().enumerate() {
        *rrf.entry(id.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
        vector_similarity.insert(id.as_str(), *similarity);
    }
    let mut in_fts: HashSet<&str> = HashSet::new();
    for (rank, id) in fts_list.iter().enumerate() {
        *rrf.entry(id.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
        in_fts.insert(id.as_str());
    }

    if rrf.is_empty() {
        return Ok(Vec::new());
    }

    // Stage 4: fetch rows, scope-filtered.
    let ids: Vec<&str> = rrf.keys().copied().collect();
    let rows = fetch_rows(store, &ids, request.container_tag)?;

    // Stage 5: per-record score normalisation.
    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .map(|row| {
            let score = rrf[row.id.as_str()];
            let similarity = match (
                vector_similarity.get(row.id.as_str()),
                in_fts.contains(row.id.as_str()),
            ) {
                // found by both: two-list RRF against its theoretical maximum
                (Some(_), true) => (score / (2.0 / RRF_K)).min(1.0),
                // BM25 only: single-list RRF, rank-dependent by design
                (None, true) => (score / (1.0 / RRF_K)).min(1.0),
                // vector only: raw cosine keeps the semantic spread
                (Some(similarity), false) => *similarity,
                (None, false) => unreachable!("id came from one of the two lists"),
            };
            SearchHit {
                id: row.id,
                content: row.content,
                similarity,
                created_at: row.created_at,
                record_type: row.record_type,
                metadata: row.metadata,
            }
        })
        .collect();

    // Stage 6: order, threshold, trim.
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.retain(|hit| hit.similarity >= request.threshold);
    hits.truncate(request.limit);

    Ok(hits)
}

/// Stage 1 + container filter, used by the deduper.
///
/// The container filter runs after the KNN because the vector table ranks
/// globally; pushing it inside would change which neighbours are returned.
pub fn find_near_duplicates(
    store: &Store,
    vector: &[f32],
    container_tag: &str,
    threshold: f64,
) -> Result<Vec<NearDuplicate>> {
    let candidates = knn(store, vector, DEDUP_KNN_K)?;

    let mut matches = Vec::new();
    for (id, distance) in candidates {
        let similarity = 1.0 - distance;
        if similarity < threshold {
            continue;
        }
        if store.get_container_tag(&id)?.as_deref() == Some(container_tag) {
            matches.push(NearDuplicate { id, similarity });
        }
    }

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(matches)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Nearest neighbours as `(id, cosine distance)`, closest first.
fn knn(store: &Store, vector: &[f32], k: usize) -> Result<Vec<(String, f64)>> {
    let mut stmt = store.conn().prepare(
        "SELECT memory_id, distance FROM vec_memories \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let results = stmt
        .query_map(params![vector_to_bytes(vector), k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(results)
}

/// BM25 match, most relevant first. The raw query text goes straight into
/// MATCH; syntax the FTS5 grammar rejects surfaces as [`MemoError::FullTextQuery`],
/// which the caller downgrades.
fn fts_match(
    store: &Store,
    text: &str,
    container_tag: Option<&str>,
    limit: usize,
) -> Result<Vec<String>> {
    let run = || -> rusqlite::Result<Vec<String>> {
        match container_tag {
            Some(tag) => {
                let mut stmt = store.conn().prepare(
                    "SELECT memory_id FROM fts_memories \
                     WHERE fts_memories MATCH ?1 AND container_tag = ?2 \
                     ORDER BY rank LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(params![text, tag, limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(rows)
            }
            None => {
                let mut stmt = store.conn().prepare(
                    "SELECT memory_id FROM fts_memories \
                     WHERE fts_memories MATCH ?1 ORDER BY rank LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![text, limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(rows)
            }
        }
    };
    run().map_err(|e| MemoError::FullTextQuery(e.to_string()).into())
}

struct FetchedRow {
    id: String,
    content: String,
    created_at: i64,
    record_type: Option<String>,
    metadata: Option<String>,
}

/// Batch-fetch candidate rows, restricted to the requested container.
fn fetch_rows(
    store: &Store,
    ids: &[&str],
    container_tag: Option<&str>,
) -> Result<Vec<FetchedRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let mut sql = format!(
        "SELECT id, content, created_at, type, metadata FROM memories \
         WHERE id IN ({})",
        placeholders.join(", ")
    );
    if container_tag.is_some() {
        sql.push_str(&format!(" AND container_tag = ?{}", ids.len() + 1));
    }

    let mut stmt = store.conn().prepare(&sql)?;

    let mut params_vec: Vec<&dyn rusqlite::types::ToSql> = ids
        .iter()
        .map(|id| id as &dyn rusqlite::types::ToSql)
        .collect();
    if let Some(ref tag) = container_tag {
        params_vec.push(tag as &dyn rusqlite::types::ToSql);
    }

    let rows = stmt
        .query_map(params_vec.as_slice(), |row| {
            Ok(FetchedRow {
                id: row.get(0)?,
                content: row.get(1)?,
                created_at: row.get(2)?,
                record_type: row.get(3)?,
                metadata: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
