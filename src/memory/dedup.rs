//! Duplicate gate for the write path.
//!
//! Two tiers: byte-identical content in the same container, then a KNN
//! lookup over the symmetric embeddings. Both tiers are container-scoped;
//! the same text may live in two containers.

use anyhow::Result;

use crate::memory::search;
use crate::memory::store::Store;

/// Verdict on a candidate insert.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupVerdict {
    /// No existing record is close enough; proceed with the insert.
    NotDuplicate,
    /// Byte-identical content already stored (similarity 1.0).
    ExactDuplicate { id: String },
    /// An existing record's embedding clears the similarity threshold.
    NearDuplicate { id: String, similarity: f64 },
}

impl DedupVerdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::NotDuplicate)
    }
}

/// Decide whether `(content, vector)` duplicates an existing record in
/// `container_tag`.
pub fn check(
    store: &Store,
    content: &str,
    vector: &[f32],
    container_tag: &str,
    enabled: bool,
    threshold: f64,
) -> Result<DedupVerdict> {
    if !enabled {
        return Ok(DedupVerdict::NotDuplicate);
    }

    if let Some(id) = store.find_exact_duplicate(content, container_tag)? {
        return Ok(DedupVerdict::ExactDuplicate { id });
    }

    let near = search::find_near_duplicates(store, vector, container_tag, threshold)?;
    match near.into_iter().next() {
        Some(closest) => Ok(DedupVerdict::NearDuplicate {
            id: closest.id,
            similarity: closest.similarity,
        }),
        None => Ok(DedupVerdict::NotDuplicate),
    }
}
