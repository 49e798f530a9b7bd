// tests/db_integration.rs

use std::path::PathBuf;

use rusqlite::Connection;
use tempfile::TempDir;

use agent::{
    config::model::DatabaseConfig,
    db::{
        connection::{db_path, init_database},
        RetentionPolicy, Store,
    },
};

const TOPIC: &str = "greengrid/oficinas/data";

fn temp_store(name: &str) -> (TempDir, PathBuf, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(name);
    let store = Store::open(&path, &DatabaseConfig::default()).expect("open store");
    (dir, path, store)
}

fn payload(n: i64) -> Vec<u8> {
    format!(r#"{{"consumo_kwh": {n}.0, "solar_kwh": 1.0, "bateria_porcentaje": 50, "savings_percent": 10}}"#)
        .into_bytes()
}

#[test]
fn capacity_three_keeps_the_three_newest() {
    let (_dir, _path, store) = temp_store("scenario.db");
    let policy = RetentionPolicy::new(3);

    for ts in 100..=104 {
        store.ingest(TOPIC, ts, &payload(ts), &policy).unwrap();
    }

    assert_eq!(store.count().unwrap(), 3);

    let recent = store.list_recent(10).unwrap();
    let ts: Vec<i64> = recent.iter().map(|r| r.received_at).collect();
    assert_eq!(ts, vec![104, 103, 102]);

    assert_eq!(store.latest().unwrap().unwrap().received_at, 104);

    let two: Vec<i64> = store.list_recent(2).unwrap().iter().map(|r| r.received_at).collect();
    assert_eq!(two, vec![104, 103]);
    assert_eq!(store.span().unwrap(), Some((102, 104)));
}

#[test]
fn schema_survives_reopen_and_ids_are_not_reused() {
    let (_dir, path, store) = temp_store("reopen.db");
    let policy = RetentionPolicy::new(2);
    store.ingest(TOPIC, 1, b"{}", &policy).unwrap();
    store.ingest(TOPIC, 2, b"{}", &policy).unwrap();
    let last = store.ingest(TOPIC, 3, b"{}", &policy).unwrap();
    drop(store);

    let store = Store::open(&path, &DatabaseConfig::default()).unwrap();
    store.init_schema().unwrap();
    store.init_schema().unwrap();
    assert_eq!(store.count().unwrap(), 2);

    let structures: i64 = rusqlite::Connection::open(&path)
        .unwrap()
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE name IN ('readings', 'readings_ts_id')",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(structures, 2);

    let next = store.ingest(TOPIC, 4, b"{}", &policy).unwrap();
    assert!(next.id > last.id, "id {} reused after {}", next.id, last.id);
}

#[test]
fn purge_on_restart_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = DatabaseConfig { path: PathBuf::from("purged.db"), ..DatabaseConfig::default() };
    let path = db_path(dir.path(), &cfg);
    assert_eq!(path, dir.path().join("purged.db"));

    {
        let store = Store::open(&path, &cfg).unwrap();
        store.insert(TOPIC, 1, b"{}").unwrap();
    }

    let purge = DatabaseConfig { purge_on_restart: true, ..cfg };
    let store = Store::open(&path, &purge).unwrap();
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn database_runs_in_wal_mode() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("wal.db");
    let conn = init_database(&path, &DatabaseConfig::default()).unwrap();
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn text_payloads_read_back_as_bytes() {
    let (_dir, path, store) = temp_store("text.db");
    let other = Connection::open(&path).unwrap();
    other
        .execute(
            "INSERT INTO readings (topic, ts, payload) VALUES (?1, ?2, ?3)",
            rusqlite::params![TOPIC, 7_i64, r#"{"a":1}"#],
        )
        .unwrap();

    let row = store.latest().unwrap().unwrap();
    assert_eq!(row.payload, br#"{"a":1}"#.to_vec());
}
