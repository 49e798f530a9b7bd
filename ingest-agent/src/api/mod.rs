//! Query side of the agent: decoding reads and the HTTP API.

pub mod http;
pub mod query;

pub use http::{router, serve, ApiState};
pub use query::{CacheSummary, DecodeError, Latest, QueryService, RecentReadings};
