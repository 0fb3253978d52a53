//! On-disk store behaviour: table synchronisation, reopen, reset.

mod helpers;

use helpers::{insert_memory, spike, DIMS};
use memo::db;
use memo::memory::store::Store;

/// Count rows through a second connection so a desynchronised index cannot
/// hide behind the store's own accessors.
fn table_count(store: &Store, sql: &str) -> i64 {
    let path = store.path().expect("on-disk store");
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.query_row(sql, [], |r| r.get(0)).unwrap()
}

#[test]
fn records_survive_reopen_with_all_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".memo").join("memo.db");

    let mut store = Store::open(&path, DIMS).unwrap();
    let id = insert_memory(&mut store, "durable fact about lifetimes", spike(0), "project:abc");
    store.close().unwrap();

    let store = Store::open(&path, DIMS).unwrap();
    let record = store.get(&id).unwrap().expect("record survives reopen");
    assert_eq!(record.content, "durable fact about lifetimes");

    assert_eq!(
        table_count(&store, "SELECT COUNT(*) FROM memories"),
        1
    );
    assert_eq!(
        table_count(&store, "SELECT COUNT(*) FROM vec_memories"),
        1
    );
    assert_eq!(
        table_count(&store, "SELECT COUNT(*) FROM fts_memories"),
        1
    );
}

#[test]
fn delete_leaves_no_rows_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.db");

    let mut store = Store::open(&path, DIMS).unwrap();
    let id = insert_memory(&mut store, "to be forgotten", spike(1), "project:abc");
    let keep = insert_memory(&mut store, "to be kept", spike(2), "project:abc");

    assert!(store.delete(&id).unwrap());

    for table_sql in [
        "SELECT COUNT(*) FROM memories",
        "SELECT COUNT(*) FROM vec_memories",
        "SELECT COUNT(*) FROM fts_memories",
    ] {
        assert_eq!(table_count(&store, table_sql), 1, "only the kept record remains");
    }
    assert!(store.get(&keep).unwrap().is_some());
}

#[test]
fn embedding_cache_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.db");

    let store = Store::open(&path, DIMS).unwrap();
    store
        .put_cached_embedding("hash-1", "model-a", &spike(3))
        .unwrap();
    store.close().unwrap();

    let store = Store::open(&path, DIMS).unwrap();
    assert_eq!(
        store.get_cached_embedding("hash-1", "model-a").unwrap(),
        Some(spike(3))
    );
}

#[test]
fn dimension_is_fixed_per_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.db");

    drop(Store::open(&path, DIMS).unwrap());
    let err = Store::open(&path, DIMS * 2).unwrap_err();
    assert!(err.to_string().contains("dimensional"));
}

#[test]
fn remove_database_allows_fresh_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.db");

    let mut store = Store::open(&path, DIMS).unwrap();
    insert_memory(&mut store, "gone after reset", spike(0), "project:abc");
    store.close().unwrap();

    assert!(db::remove_database(&path).unwrap());

    // A different dimensionality is fine now: the store is new.
    let store = Store::open(&path, DIMS * 2).unwrap();
    assert_eq!(store.count(None).unwrap(), 0);
}

#[test]
fn reindex_after_external_damage_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.db");

    let mut store = Store::open(&path, DIMS).unwrap();
    let id = insert_memory(&mut store, "indexed text about traits", spike(0), "project:abc");
    store.close().unwrap();

    // Damage the FTS table directly.
    {
        memo::db::load_sqlite_vec();
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "DELETE FROM fts_memories WHERE memory_id = ?1",
            rusqlite::params![id],
        )
        .unwrap();
    }

    let mut store = Store::open(&path, DIMS).unwrap();
    let first = store.reindex_fulltext().unwrap();
    assert_eq!(first.added, 1);
    assert_eq!(first.removed, 0);

    let second = store.reindex_fulltext().unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.removed, 0);
}
