// src/db/store.rs
//! Durable, ordered persistence of readings.
//!
//! The store is a single SQLite file holding the `readings` table. One
//! `Store` is opened at startup and shared as `Arc<Store>` between the
//! ingestion worker (writes, evictions) and the query service (reads).
//!
//! Two connections are kept:
//! - the **writer**, which serialises every insert and eviction;
//! - the **reader**, which in WAL mode sees the last committed state and
//!   never waits on the writer.
//!
//! Every method is synchronous. Async callers go through
//! [`crate::db::with_store`] so SQLite I/O stays off the runtime workers.

use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use thiserror::Error;

use crate::config::model::DatabaseConfig;
use crate::db::connection::{apply_schema, init_database, open_db_connection, open_read_only};
use crate::db::retention::RetentionPolicy;

const INSERT_SQL: &str = "INSERT INTO readings (topic, ts, payload) VALUES (?1, ?2, ?3)";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM readings";

const DELETE_OLDEST_SQL: &str = "\
    DELETE FROM readings WHERE id IN ( \
        SELECT id FROM readings ORDER BY ts ASC, id ASC LIMIT ?1 \
    )";

// CAST keeps rows written as TEXT by older deployments readable as bytes.
const LIST_RECENT_SQL: &str = "\
    SELECT id, topic, ts, CAST(payload AS BLOB) FROM readings \
    ORDER BY ts DESC, id DESC LIMIT ?1";

const SPAN_SQL: &str = "SELECT MIN(ts), MAX(ts) FROM readings";

/// Persistence failures, surfaced to whoever called the failing operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl StorageError {
    /// True when the operation gave up waiting for a database lock.
    pub fn is_busy(&self) -> bool {
        match self {
            StorageError::Sql(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

/// One persisted telemetry record. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub id:          i64,
    pub topic:       String,
    /// Receipt time in milliseconds since the Unix epoch.
    pub received_at: i64,
    pub payload:     Vec<u8>,
}

impl Reading {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Reading {
            id:          row.get(0)?,
            topic:       row.get(1)?,
            received_at: row.get(2)?,
            payload:     row.get(3)?,
        })
    }
}

/// Result of one atomic insert-then-trim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub id:      i64,
    pub evicted: u64,
}

#[derive(Debug)]
pub struct Store {
    path:   PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at `path` and make sure the schema exists.
    pub fn open(path: &Path, cfg: &DatabaseConfig) -> Result<Self, StorageError> {
        let writer = init_database(path, cfg)?;
        let reader = open_db_connection(path, cfg)?;
        Ok(Store {
            path:   path.to_path_buf(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Open an existing store for inspection. Every write through it fails.
    pub fn open_read_only(path: &Path, cfg: &DatabaseConfig) -> Result<Self, StorageError> {
        Ok(Store {
            path:   path.to_path_buf(),
            writer: Mutex::new(open_read_only(path, cfg)?),
            reader: Mutex::new(open_read_only(path, cfg)?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-apply the schema. A no-op on an initialised store.
    pub fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.writer()?;
        apply_schema(&conn)?;
        Ok(())
    }

    /// Append a reading and return its id.
    pub fn insert(&self, topic: &str, received_at: i64, payload: &[u8]) -> Result<i64, StorageError> {
        let conn = self.writer()?;
        conn.prepare_cached(INSERT_SQL)?
            .execute(params![topic, received_at, payload])?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a reading and, when `policy` asks for it, trim the table back
    /// to capacity, all inside one transaction.
    pub fn ingest(
        &self,
        topic: &str,
        received_at: i64,
        payload: &[u8],
        policy: &RetentionPolicy,
    ) -> Result<IngestOutcome, StorageError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.prepare_cached(INSERT_SQL)?
            .execute(params![topic, received_at, payload])?;
        let id = tx.last_insert_rowid();

        let evicted = if policy.should_check(id) {
            evict_excess(&tx, policy)?
        } else {
            0
        };

        tx.commit()?;
        Ok(IngestOutcome { id, evicted })
    }

    /// Current number of rows, as of the last committed write.
    pub fn count(&self) -> Result<u64, StorageError> {
        let conn = self.reader()?;
        Ok(count_rows(&conn)?)
    }

    /// Remove the `n` oldest rows by `(ts, id)`. Returns how many went away.
    pub fn delete_oldest(&self, n: i64) -> Result<u64, StorageError> {
        if n <= 0 {
            return Ok(0);
        }
        let conn = self.writer()?;
        let deleted = conn.prepare_cached(DELETE_OLDEST_SQL)?.execute([n])?;
        Ok(deleted as u64)
    }

    /// Count-and-delete as one immediate transaction, so no other writer can
    /// slip an insert between the two.
    pub fn trim_to_capacity(&self, policy: &RetentionPolicy) -> Result<u64, StorageError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let evicted = evict_excess(&tx, policy)?;
        tx.commit()?;
        Ok(evicted)
    }

    /// Up to `limit` readings, most recent first.
    pub fn list_recent(&self, limit: i64) -> Result<Vec<Reading>, StorageError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(LIST_RECENT_SQL)?;
        let rows = stmt
            .query_map([limit], Reading::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// The most recent reading, or `None` on an empty store.
    pub fn latest(&self) -> Result<Option<Reading>, StorageError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare_cached(LIST_RECENT_SQL)?;
        Ok(stmt.query_row([1], Reading::from_row).optional()?)
    }

    /// Receipt times of the oldest and newest retained readings.
    pub fn span(&self) -> Result<Option<(i64, i64)>, StorageError> {
        let conn = self.reader()?;
        let (oldest, newest): (Option<i64>, Option<i64>) =
            conn.query_row(SPAN_SQL, [], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(oldest.zip(newest))
    }

    /// Fold the WAL back into the main file and truncate it.
    pub fn checkpoint(&self) -> Result<(), StorageError> {
        let conn = self.writer()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Task("writer connection lock poisoned".into()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Task("reader connection lock poisoned".into()))
    }
}

fn count_rows(conn: &Connection) -> rusqlite::Result<u64> {
    let c: i64 = conn.query_row(COUNT_SQL, [], |r| r.get(0))?;
    Ok(c.max(0) as u64)
}

/// Delete whatever exceeds the policy's capacity. Must run inside the
/// caller's transaction.
fn evict_excess(conn: &Connection, policy: &RetentionPolicy) -> rusqlite::Result<u64> {
    let excess = policy.excess(count_rows(conn)?);
    if excess == 0 {
        return Ok(0);
    }
    let deleted = conn
        .prepare_cached(DELETE_OLDEST_SQL)?
        .execute([i64::try_from(excess).unwrap_or(i64::MAX)])?;
    Ok(deleted as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("readings.db"), &DatabaseConfig::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn ids_increase_in_insert_order() {
        let (_dir, store) = temp_store();
        let a = store.insert("t", 100, b"{}").unwrap();
        let b = store.insert("t", 100, b"{}").unwrap();
        let c = store.insert("t", 99, b"{}").unwrap();
        assert!(a < b && b < c);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn read_only_store_sees_rows_but_cannot_write() {
        let (dir, store) = temp_store();
        store.insert("t", 1, b"{}").unwrap();
        store.insert("t", 2, b"{}").unwrap();

        let ro = Store::open_read_only(store.path(), &DatabaseConfig::default()).unwrap();
        assert_eq!(ro.count().unwrap(), 2);
        assert_eq!(ro.latest().unwrap().unwrap().received_at, 2);
        assert!(matches!(ro.insert("t", 3, b"{}"), Err(StorageError::Sql(_))));
        assert_eq!(store.count().unwrap(), 2);

        let missing = dir.path().join("missing.db");
        assert!(Store::open_read_only(&missing, &DatabaseConfig::default()).is_err());
        assert!(!missing.exists());
    }

    #[test]
    fn payload_bytes_come_back_unchanged() {
        let (_dir, store) = temp_store();
        let raw = [0xff_u8, 0x00, b'{', 0x80];
        store.insert("t", 1, &raw).unwrap();
        assert_eq!(store.latest().unwrap().unwrap().payload, raw.to_vec());
    }

    #[test]
    fn delete_oldest_breaks_timestamp_ties_by_id() {
        let (_dir, store) = temp_store();
        let first = store.insert("t", 500, b"a").unwrap();
        let second = store.insert("t", 500, b"b").unwrap();
        let early = store.insert("t", 100, b"c").unwrap();

        assert_eq!(store.delete_oldest(2).unwrap(), 2);
        let left: Vec<i64> = store.list_recent(10).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(left, vec![second]);
        assert!(!left.contains(&first) && !left.contains(&early));
    }

    #[test]
    fn delete_oldest_non_positive_is_noop() {
        let (_dir, store) = temp_store();
        store.insert("t", 1, b"x").unwrap();
        assert_eq!(store.delete_oldest(0).unwrap(), 0);
        assert_eq!(store.delete_oldest(-3).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn delete_more_than_present_empties_the_table() {
        let (_dir, store) = temp_store();
        for ts in 0..4 {
            store.insert("t", ts, b"x").unwrap();
        }
        assert_eq!(store.delete_oldest(10).unwrap(), 4);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.latest().unwrap().is_none());
    }

    #[test]
    fn span_tracks_oldest_and_newest() {
        let (_dir, store) = temp_store();
        assert_eq!(store.span().unwrap(), None);
        store.insert("t", 300, b"x").unwrap();
        store.insert("t", 100, b"x").unwrap();
        assert_eq!(store.span().unwrap(), Some((100, 300)));
    }

    #[test]
    fn busy_detection_only_matches_lock_errors() {
        let busy = StorageError::Sql(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(busy.is_busy());
        assert!(!StorageError::Task("gone".into()).is_busy());
    }
}
