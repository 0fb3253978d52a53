//! Record and metadata type definitions.

use serde::{Deserialize, Serialize};

use crate::identity::Provenance;

/// `type` value of records produced by the importer.
pub const DOC_CHUNK_TYPE: &str = "doc_chunk";

/// A memory record as stored in the `memories` table.
///
/// Records are immutable once written: updates are modelled as
/// delete-then-insert, and imported records are resynchronised wholesale via
/// the replace-by-source protocol.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    /// `mem_{millis}_{nonce}`, unique within a store.
    pub id: String,
    /// Textual payload, stored verbatim.
    pub content: String,
    /// Unit-length embedding of the content.
    pub vector: Vec<f32>,
    /// Scope this record belongs to. Immutable.
    pub container_tag: String,
    /// Stable identifier of the import source, if imported.
    pub source_key: Option<String>,
    /// Discriminator: [`DOC_CHUNK_TYPE`] for imported records.
    pub record_type: Option<String>,
    /// Opaque JSON carried through storage and search untouched.
    pub metadata: Option<String>,
    /// Millisecond timestamps.
    pub created_at: i64,
    pub updated_at: i64,
    /// Best-effort provenance captured at insert.
    pub provenance: Provenance,
}

impl MemoryRecord {
    /// Build a user-added record with a fresh id and current timestamps.
    pub fn new(content: String, vector: Vec<f32>, container_tag: String) -> Self {
        let now = now_millis();
        Self {
            id: new_memory_id(),
            content,
            vector,
            container_tag,
            source_key: None,
            record_type: None,
            metadata: None,
            created_at: now,
            updated_at: now,
            provenance: Provenance::default(),
        }
    }
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a record id: `mem_{decimal millis}_{9-char base36 nonce}`.
///
/// The nonce keeps ids distinct when many records are created within one
/// millisecond (bulk imports); a residual collision is handled by the
/// store's regenerate-and-retry on insert.
pub fn new_memory_id() -> String {
    use rand::Rng;
    const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let nonce: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("mem_{}_{nonce}", now_millis())
}

/// Metadata attached to markdown chunks, serialized into the record's
/// opaque metadata field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub source_path: String,
    pub source_key: String,
    pub start_line: usize,
    pub end_line: usize,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub chunk_hash: String,
}

/// Metadata attached to repo-map entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoMapMetadata {
    pub source_path: String,
    pub source_key: String,
    pub language: String,
    pub symbols: Vec<String>,
    /// Always `"repo-map"`.
    pub import_type: String,
}
