//! The three-table synchronised store.
//!
//! Every live record owns exactly one row in `memories`, one in
//! `vec_memories`, and one in `fts_memories`. All multi-table writes run
//! inside a transaction so the invariant holds across crashes; the only
//! supported way to resynchronise imported content is
//! [`Store::replace_by_source`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Transaction};

use crate::db;
use crate::error::MemoError;
use crate::memory::types::{new_memory_id, MemoryRecord};
use crate::memory::{bytes_to_vector, vector_to_bytes};

/// SQLITE_CONSTRAINT_PRIMARYKEY — an id collision rather than a schema bug.
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;

/// How often an insert may regenerate a colliding id before giving up.
const ID_RETRY_LIMIT: usize = 3;

/// Handle over the per-project database.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
    dims: usize,
}

/// A record row as read back from the `memories` table. Vectors live in the
/// KNN index and are not rehydrated on reads.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub content: String,
    pub container_tag: String,
    pub source_key: Option<String>,
    pub record_type: Option<String>,
    pub metadata: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Counts returned by [`Store::replace_by_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub deleted: usize,
    pub inserted: usize,
}

/// Counts returned by [`Store::reindex_fulltext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReindexOutcome {
    pub added: usize,
    pub removed: usize,
}

impl Store {
    /// Open (or create) the store at `path` for `dims`-wide vectors.
    pub fn open(path: impl AsRef<Path>, dims: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = db::open_database(&path, dims)?;
        Ok(Self {
            conn,
            path: Some(path),
            dims,
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory(dims: usize) -> Result<Self> {
        db::load_sqlite_vec();
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        db::schema::init_schema(&conn, dims)?;
        Ok(Self {
            conn,
            path: None,
            dims,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Size of the database file in bytes, if on disk.
    pub fn file_size(&self) -> u64 {
        self.path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Record the model id used for this store's vectors, once.
    pub fn record_model_id(&self, model_id: &str) -> Result<()> {
        if db::schema::get_model_id(&self.conn)?.is_none() {
            db::schema::set_model_id(&self.conn, model_id)?;
        }
        Ok(())
    }

    /// Insert one record into all three live tables atomically.
    ///
    /// On an id collision the id is regenerated and the insert retried; the
    /// record carries the finally-used id on return.
    pub fn insert(&mut self, record: &mut MemoryRecord) -> Result<()> {
        self.check_dims(&record.vector)?;

        for attempt in 0..=ID_RETRY_LIMIT {
            let tx = self.conn.transaction()?;
            match insert_in_tx(&tx, record) {
                Ok(()) => {
                    tx.commit()?;
                    return Ok(());
                }
                Err(e) if is_id_collision(&e) && attempt < ID_RETRY_LIMIT => {
                    drop(tx);
                    let fresh = new_memory_id();
                    tracing::warn!(old = %record.id, new = %fresh, "record id collision, regenerating");
                    record.id = fresh;
                }
                Err(e) if is_id_collision(&e) => {
                    return Err(MemoError::IntegrityViolation(format!(
                        "id collision persisted after {ID_RETRY_LIMIT} retries: {}",
                        record.id
                    ))
                    .into());
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("insert retry loop always returns");
    }

    /// Remove a record from all three tables. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let removed = delete_in_tx(&tx, id)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Atomically replace every record matching `(container_tag, source_key)`
    /// with `records`. Either the whole replacement commits or the prior
    /// state remains.
    pub fn replace_by_source(
        &mut self,
        container_tag: &str,
        source_key: &str,
        records: &mut [MemoryRecord],
    ) -> Result<ReplaceOutcome> {
        for record in records.iter() {
            self.check_dims(&record.vector)?;
        }

        let tx = self.conn.transaction()?;

        let old_ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM memories WHERE container_tag = ?1 AND source_key = ?2",
            )?;
            let ids = stmt
                .query_map(params![container_tag, source_key], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            ids
        };

        for id in &old_ids {
            delete_in_tx(&tx, id)?;
        }

        for record in records.iter_mut() {
            // Collisions inside the batch are vanishingly rare; regenerate
            // in place rather than aborting the whole replacement.
            let mut attempt = 0;
            loop {
                match insert_in_tx(&tx, record) {
                    Ok(()) => break,
                    Err(e) if is_id_collision(&e) && attempt < ID_RETRY_LIMIT => {
                        attempt += 1;
                        record.id = new_memory_id();
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tx.commit()?;

        tracing::debug!(
            container = container_tag,
            source = source_key,
            deleted = old_ids.len(),
            inserted = records.len(),
            "replaced source records"
        );

        Ok(ReplaceOutcome {
            deleted: old_ids.len(),
            inserted: records.len(),
        })
    }

    /// Recent records, newest first. `limit < 0` means unlimited.
    pub fn list(&self, container_tag: Option<&str>, limit: i64) -> Result<Vec<StoredRecord>> {
        let sql_base = "SELECT id, content, container_tag, source_key, type, metadata, \
             created_at, updated_at FROM memories";
        let order = " ORDER BY created_at DESC, id DESC LIMIT ?";
        let rows = match container_tag {
            Some(tag) => {
                let sql = format!("{sql_base} WHERE container_tag = ?1{order}");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![tag, limit], row_to_stored)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("{sql_base}{order}");
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit], row_to_stored)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    /// Fetch one record by id.
    pub fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, content, container_tag, source_key, type, metadata, \
             created_at, updated_at FROM memories WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_stored(row)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self, container_tag: Option<&str>) -> Result<u64> {
        let count: i64 = match container_tag {
            Some(tag) => self.conn.query_row(
                "SELECT COUNT(*) FROM memories WHERE container_tag = ?1",
                params![tag],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    /// Record counts grouped by container tag, largest first.
    pub fn count_by_container(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT container_tag, COUNT(*) FROM memories \
             GROUP BY container_tag ORDER BY COUNT(*) DESC, container_tag",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Records derived from one import source.
    pub fn count_by_source(&self, container_tag: &str, source_key: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE container_tag = ?1 AND source_key = ?2",
            params![container_tag, source_key],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Exact-content duplicate lookup within a container.
    pub fn find_exact_duplicate(
        &self,
        content: &str,
        container_tag: &str,
    ) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM memories WHERE container_tag = ?1 AND content = ?2 LIMIT 1",
        )?;
        let mut rows = stmt.query(params![container_tag, content])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Resolve a record's container for the forget cross-check.
    pub fn get_container_tag(&self, id: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT container_tag FROM memories WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Idempotent full-text repair: drop orphaned rows, backfill missing ones.
    pub fn reindex_fulltext(&mut self) -> Result<ReindexOutcome> {
        let tx = self.conn.transaction()?;

        let removed = tx.execute(
            "DELETE FROM fts_memories WHERE memory_id NOT IN (SELECT id FROM memories)",
            [],
        )?;

        let missing: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT id, content, container_tag FROM memories \
                 WHERE id NOT IN (SELECT memory_id FROM fts_memories)",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        for (id, content, container_tag) in &missing {
            tx.execute(
                "INSERT INTO fts_memories (content, memory_id, container_tag) VALUES (?1, ?2, ?3)",
                params![content, id, container_tag],
            )?;
        }

        tx.commit()?;

        Ok(ReindexOutcome {
            added: missing.len(),
            removed,
        })
    }

    /// Look up a persistently cached embedding.
    pub fn get_cached_embedding(
        &self,
        content_hash: &str,
        model_id: &str,
    ) -> Result<Option<Vec<f32>>> {
        let mut stmt = self.conn.prepare(
            "SELECT embedding FROM embedding_cache WHERE content_hash = ?1 AND model_id = ?2",
        )?;
        let mut rows = stmt.query(params![content_hash, model_id])?;
        match rows.next()? {
            Some(row) => {
                let blob: Vec<u8> = row.get(0)?;
                Ok(Some(bytes_to_vector(&blob)))
            }
            None => Ok(None),
        }
    }

    /// Persist an embedding, replacing any previous row for the same key.
    pub fn put_cached_embedding(
        &self,
        content_hash: &str,
        model_id: &str,
        vector: &[f32],
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO embedding_cache \
             (content_hash, model_id, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                content_hash,
                model_id,
                vector_to_bytes(vector),
                crate::memory::types::now_millis()
            ],
        )?;
        Ok(())
    }

    /// Checkpoint the WAL and close the connection.
    pub fn close(self) -> Result<()> {
        db::checkpoint(&self.conn)?;
        self.conn
            .close()
            .map_err(|(_, e)| anyhow::Error::new(e).context("failed to close database"))?;
        Ok(())
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(MemoError::IntegrityViolation(format!(
                "vector has {} dimensions, store expects {}",
                vector.len(),
                self.dims
            ))
            .into());
        }
        Ok(())
    }
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        container_tag: row.get(2)?,
        source_key: row.get(3)?,
        record_type: row.get(4)?,
        metadata: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Write one row into each of the three live tables.
fn insert_in_tx(tx: &Transaction<'_>, record: &MemoryRecord) -> Result<()> {
    tx.execute(
        "INSERT INTO memories (id, content, container_tag, source_key, type, metadata, \
         created_at, updated_at, display_name, user_name, user_email, project_path, \
         project_name, git_repo_url) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.id,
            record.content,
            record.container_tag,
            record.source_key,
            record.record_type,
            record.metadata,
            record.created_at,
            record.updated_at,
            record.provenance.display_name,
            record.provenance.user_name,
            record.provenance.user_email,
            record.provenance.project_path,
            record.provenance.project_name,
            record.provenance.git_repo_url,
        ],
    )?;

    tx.execute(
        "INSERT INTO vec_memories (memory_id, embedding) VALUES (?1, ?2)",
        params![record.id, vector_to_bytes(&record.vector)],
    )?;

    tx.execute(
        "INSERT INTO fts_memories (content, memory_id, container_tag) VALUES (?1, ?2, ?3)",
        params![record.content, record.id, record.container_tag],
    )?;

    Ok(())
}

/// Remove one record from all three tables. Returns whether it existed.
fn delete_in_tx(tx: &Transaction<'_>, id: &str) -> Result<bool> {
    let removed = tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Ok(false);
    }
    tx.execute("DELETE FROM vec_memories WHERE memory_id = ?1", params![id])?;
    tx.execute("DELETE FROM fts_memories WHERE memory_id = ?1", params![id])?;
    Ok(true)
}

fn is_id_collision(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, msg)) => {
            e.extended_code == SQLITE_CONSTRAINT_PRIMARYKEY
                && msg
                    .as_deref()
                    .map(|m| m.contains("memories.id"))
                    .unwrap_or(true)
        }
        _ => false,
    }
}
