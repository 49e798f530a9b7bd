//! Print the retained window of a GreenGrid cache, newest first.
//!
//! `cache_dump [DB_PATH] [LIMIT]` (defaults: `greengrid.db`, 20)
//!
//! Safe to run next to a live agent: the store is opened read-only, so the
//! schema is never touched and nothing is written.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};

use agent::{
    api::query::decode,
    config::model::DatabaseConfig,
    db::Store,
};
use shared::constants::DEFAULT_DB_FILE;

const DEFAULT_LIMIT: i64 = 20;

fn local_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| format!("{ms}ms"))
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let path = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_DB_FILE.to_owned()));
    let limit = match args.next() {
        Some(raw) => raw.parse::<i64>().with_context(|| format!("invalid limit '{raw}'"))?,
        None => DEFAULT_LIMIT,
    };

    if !path.exists() {
        bail!("no cache at {}", path.display());
    }
    let store = Store::open_read_only(&path, &DatabaseConfig::default())
        .with_context(|| format!("opening {}", path.display()))?;

    let count = store.count()?;
    match store.span()? {
        Some((oldest, newest)) => println!(
            "{}: {} reading(s) from {} to {}",
            path.display(),
            count,
            local_time(oldest),
            local_time(newest)
        ),
        None => {
            println!("{}: empty", path.display());
            return Ok(());
        }
    }

    for row in store.list_recent(limit)? {
        let (id, ts, topic) = (row.id, row.received_at, row.topic.clone());
        match decode(row) {
            Ok(view) => match view.telemetry() {
                Some(t) => println!("#{id:<8} {}  {topic}  {t}", local_time(ts)),
                None => println!("#{id:<8} {}  {topic}  {}", local_time(ts), view.data),
            },
            Err(e) => println!("#{id:<8} {}  {topic}  !! {}", local_time(ts), e),
        }
    }
    Ok(())
}
