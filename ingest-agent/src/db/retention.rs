// src/db/retention.rs
//! Fixed-capacity retention for the readings table.
//!
//! The table behaves as a circular cache: once it holds `capacity` rows,
//! every new reading pushes out the oldest one. With `check_every = K > 1`
//! the trim only runs on every K-th id, which lets the table grow at most
//! `K - 1` rows past capacity between trims.

use crate::config::model::RetentionConfig;
use crate::db::store::{StorageError, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    capacity:    u64,
    check_every: u64,
}

impl RetentionPolicy {
    /// Trim after every insert.
    pub fn new(capacity: u64) -> Self {
        Self { capacity, check_every: 1 }
    }

    pub fn with_check_every(mut self, every: u64) -> Self {
        self.check_every = every.max(1);
        self
    }

    pub fn from_config(cfg: &RetentionConfig) -> Self {
        Self::new(cfg.capacity).with_check_every(cfg.check_every)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn check_every(&self) -> u64 {
        self.check_every
    }

    /// Rows to delete for a table currently holding `count` rows.
    pub fn excess(&self, count: u64) -> u64 {
        count.saturating_sub(self.capacity)
    }

    /// Whether the insert that was assigned `id` should be followed by a trim.
    pub fn should_check(&self, id: i64) -> bool {
        self.check_every <= 1 || id.rem_euclid(self.check_every as i64) == 0
    }

    /// Trim the store to capacity right now, regardless of `check_every`.
    pub fn enforce(&self, store: &Store) -> Result<u64, StorageError> {
        let evicted = store.trim_to_capacity(self)?;
        if evicted > 0 {
            log::debug!("retention evicted {} reading(s), capacity={}", evicted, self.capacity);
        }
        Ok(evicted)
    }
}
