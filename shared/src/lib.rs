//! Types and constants shared by the ingest agent, its tools and the
//! dashboard-facing API.

pub mod constants;
pub mod events;

pub use events::{OfficeTelemetry, ReadingView};
