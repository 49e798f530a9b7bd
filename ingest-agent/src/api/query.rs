//! Read-only view of the retained window.
//!
//! Payloads are decoded into JSON documents here and nowhere else. A row that
//! does not decode is left out of the result and reported next to it, so one
//! corrupt row never hides the valid readings around it.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use shared::ReadingView;
use thiserror::Error;

use crate::db::{with_store, Reading, RetentionPolicy, StorageError, Store};

/// A stored payload that is not a JSON document.
#[derive(Debug, Error)]
#[error("reading {id}: payload is not valid JSON: {source}")]
pub struct DecodeError {
    pub id:     i64,
    #[source]
    pub source: serde_json::Error,
}

/// `get_recent` result: the decodable rows plus what was skipped.
#[derive(Debug, Default)]
pub struct RecentReadings {
    pub readings: Vec<ReadingView>,
    pub skipped:  Vec<DecodeError>,
}

impl RecentReadings {
    pub fn skipped_ids(&self) -> Vec<i64> {
        self.skipped.iter().map(|e| e.id).collect()
    }
}

/// `get_latest` result. `Empty` means no data yet, not a failure.
#[derive(Debug)]
pub enum Latest {
    Empty,
    Reading(ReadingView),
    Undecodable(DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSummary {
    pub count:     u64,
    pub capacity:  u64,
    pub oldest_ts: Option<i64>,
    pub newest_ts: Option<i64>,
}

pub fn decode(reading: Reading) -> Result<ReadingView, DecodeError> {
    let data: Value = serde_json::from_slice(&reading.payload)
        .map_err(|source| DecodeError { id: reading.id, source })?;
    Ok(ReadingView {
        id:    reading.id,
        ts:    reading.received_at,
        topic: reading.topic,
        data,
    })
}

#[derive(Clone)]
pub struct QueryService {
    store:  Arc<Store>,
    policy: RetentionPolicy,
}

impl QueryService {
    pub fn new(store: Arc<Store>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Up to `limit` readings, most recent first, undecodable rows skipped.
    pub async fn get_recent(&self, limit: i64) -> Result<RecentReadings, StorageError> {
        let rows = with_store(&self.store, move |s| s.list_recent(limit)).await?;

        let mut out = RecentReadings { readings: Vec::with_capacity(rows.len()), skipped: Vec::new() };
        for row in rows {
            match decode(row) {
                Ok(view) => out.readings.push(view),
                Err(e) => {
                    counter!("greengrid_payload_decode_errors_total").increment(1);
                    log::warn!("Skipping {}", e);
                    out.skipped.push(e);
                }
            }
        }
        Ok(out)
    }

    pub async fn get_latest(&self) -> Result<Latest, StorageError> {
        let latest = with_store(&self.store, |s| s.latest()).await?;
        Ok(match latest {
            None => Latest::Empty,
            Some(row) => match decode(row) {
                Ok(view) => Latest::Reading(view),
                Err(e) => {
                    counter!("greengrid_payload_decode_errors_total").increment(1);
                    log::warn!("Latest reading undecodable: {}", e);
                    Latest::Undecodable(e)
                }
            },
        })
    }

    pub async fn summary(&self) -> Result<CacheSummary, StorageError> {
        let capacity = self.policy.capacity();
        with_store(&self.store, move |s| {
            let count = s.count()?;
            let span = s.span()?;
            Ok(CacheSummary {
                count,
                capacity,
                oldest_ts: span.map(|(oldest, _)| oldest),
                newest_ts: span.map(|(_, newest)| newest),
            })
        })
        .await
    }
}
