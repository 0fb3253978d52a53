//! SQL DDL for the memo store.
//!
//! Four logical tables: `memories` (record rows), `vec_memories` (vec0
//! cosine KNN index), `fts_memories` (FTS5 keyword index), and
//! `embedding_cache` (persistent content-addressed vectors), plus a
//! `store_meta` key/value table pinning the vector dimension and model.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization.

use anyhow::{bail, Result};
use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Record rows, one per memory
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    container_tag TEXT NOT NULL,
    source_key TEXT,
    type TEXT,
    metadata TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    display_name TEXT,
    user_name TEXT,
    user_email TEXT,
    project_path TEXT,
    project_name TEXT,
    git_repo_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_container ON memories(container_tag);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_source ON memories(container_tag, source_key);

-- Keyword search (BM25). Standalone table so rows can be repaired by id.
CREATE VIRTUAL TABLE IF NOT EXISTS fts_memories USING fts5(
    content,
    memory_id UNINDEXED,
    container_tag UNINDEXED,
    tokenize = 'unicode61 remove_diacritics 2'
);

-- Persistent embedding cache, content-addressed per model
CREATE TABLE IF NOT EXISTS embedding_cache (
    content_hash TEXT NOT NULL,
    model_id TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (content_hash, model_id)
);

-- Store metadata
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all tables for a store with `dims`-wide vectors. Idempotent.
pub fn init_schema(conn: &Connection, dims: usize) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // vec0 virtual table is created separately: the column width is baked
    // into the DDL, and cosine distance keeps `similarity = 1 - distance`
    // exact for unit vectors.
    let vec_sql = format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_memories USING vec0(
            memory_id TEXT PRIMARY KEY,
            embedding FLOAT[{dims}] distance_metric=cosine
        );"
    );
    conn.execute_batch(&vec_sql)?;

    pin_dimensions(conn, dims)?;
    Ok(())
}

/// Record the vector dimension on first init; reject a mismatch afterwards.
/// The vec0 column width cannot change once the table exists.
fn pin_dimensions(conn: &Connection, dims: usize) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('embedding_dimensions', ?1)",
        [dims.to_string()],
    )?;

    let stored: String = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'embedding_dimensions'",
        [],
        |row| row.get(0),
    )?;
    let stored: usize = stored.parse().unwrap_or(0);
    if stored != dims {
        bail!(
            "store was created with {stored}-dimensional vectors but the \
             configured model produces {dims}. Re-import into a fresh store \
             (`memo reset`) to change dimensions."
        );
    }
    Ok(())
}

/// Read the model id recorded at first write, if any.
pub fn get_model_id(conn: &Connection) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM store_meta WHERE key = 'embedding_model'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Record the model id used for this store's vectors.
pub fn set_model_id(conn: &Connection, model_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('embedding_model', ?1)",
        [model_id],
    )?;
    Ok(())
}
