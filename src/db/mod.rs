//! Database initialization — sqlite-vec registration, pragmas, and schema.

pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
///
/// The extension is linked statically, so this replaces the loadable-library
/// dance entirely: every connection opened afterwards has `vec0` available.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the store database at the given path with pragmas
/// applied and schema initialized for `dims`-wide vectors.
pub fn open_database(path: impl AsRef<Path>, dims: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path).with_context(|| {
        format!(
            "failed to open database at {}. If the file is corrupt, \
             run `memo reset` to start fresh.",
            path.display()
        )
    })?;

    apply_pragmas(&conn)?;

    schema::init_schema(&conn, dims).context("failed to initialize schema")?;

    // Quick integrity check after schema init
    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        anyhow::bail!(
            "database integrity check failed: {integrity}. \
             Run `memo reset` and re-import your sources."
        );
    }

    tracing::debug!(path = %path.display(), dims, "database initialized");
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    // Wait up to 5 seconds for a competing writer instead of failing
    conn.pragma_update(None, "busy_timeout", "5000")?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Negative cache_size is KiB: 64 MiB page cache
    conn.pragma_update(None, "cache_size", "-65536")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Flush the WAL into the main file and truncate it. Called before exit.
pub fn checkpoint(conn: &Connection) -> Result<()> {
    // wal_checkpoint returns a (busy, log, checkpointed) row.
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}

/// Delete the database file and its WAL sidecars. The store can be
/// re-initialized by the next open.
pub fn remove_database(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(path)
        .with_context(|| format!("failed to remove {}", path.display()))?;
    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar_path(path, suffix);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)
                .with_context(|| format!("failed to remove {}", sidecar.display()))?;
        }
    }
    Ok(true)
}

fn sidecar_path(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    std::path::PathBuf::from(name)
}
