// src/db/mod.rs
//! Public façade for the storage layer (re-exports plus `with_store`).

pub mod connection;
pub mod maintenance;
pub mod retention;
pub mod store;

use std::sync::Arc;

pub use retention::RetentionPolicy;
pub use store::{IngestOutcome, Reading, StorageError, Store};

/// Run a store operation on tokio's blocking pool.
///
/// A cancelled or panicking task is reported as `StorageError::Task`; the
/// SQLite work itself always runs to completion, so a caller that goes away
/// mid-request never leaves a half-written row behind.
pub async fn with_store<T, F>(store: &Arc<Store>, op: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce(&Store) -> Result<T, StorageError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}
