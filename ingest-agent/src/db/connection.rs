// src/db/connection.rs
//! Opening and initialising SQLite with runtime parameters.

use std::{fs, path::{Path, PathBuf}};
use rusqlite::{Connection, OpenFlags};
use crate::config::model::DatabaseConfig;
use crate::db::store::StorageError;

const SCHEMA: &str = include_str!("../../resources/schema.sql");

pub fn db_path(base_dir: &Path, cfg: &DatabaseConfig) -> PathBuf {
    base_dir.join(&cfg.path)
}

pub fn open_db_connection(path: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(cfg.busy_timeout)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", cfg.synchronous.as_str())?;
    Ok(conn)
}

/// Open an existing database without write access. No pragmas are set and
/// the file is never created.
pub fn open_read_only(path: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(cfg.busy_timeout)?;
    Ok(conn)
}

/// Create the `readings` table and its index if they are missing.
/// Running it against an initialised database changes nothing.
pub fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Open the writer connection for `path`, purging the file first when
/// configured to, and make sure the schema exists.
pub fn init_database(path: &Path, cfg: &DatabaseConfig) -> Result<Connection, StorageError> {
    if cfg.purge_on_restart && path.exists() {
        fs::remove_file(path)?;
        for suffix in ["-wal", "-shm"] {
            let side = sidecar(path, suffix);
            if side.exists() {
                fs::remove_file(side)?;
            }
        }
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let conn = open_db_connection(path, cfg)?;
    conn.pragma_update(None, "journal_size_limit", cfg.journal_size_limit as i64)?;
    apply_schema(&conn)?;
    log::info!("Database ready at {}", path.display());
    Ok(conn)
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
