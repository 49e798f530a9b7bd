//! Document types exchanged around the telemetry cache.
//!
//! The cache itself stores payloads as opaque bytes. These types describe
//! what the office publishers conventionally send and what the query API
//! hands back to the dashboard:
//!
//! - [`OfficeTelemetry`] is the JSON object a publisher emits on the bus.
//! - [`ReadingView`] is one retained reading as served by `GET /readings`
//!   and `GET /last`, with the payload already decoded into `data`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Conventional telemetry document published by an office meter.
///
/// Nothing on the write path enforces this shape; it is only used by
/// publishers and by readers that want typed access to `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficeTelemetry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edificio: Option<String>,
    /// ISO-8601 publisher clock. Informational only, the cache orders by
    /// its own receipt time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub consumo_kwh: f64,
    pub solar_kwh: f64,
    pub bateria_porcentaje: u8,
    pub savings_percent: u8,
}

impl OfficeTelemetry {
    /// Energy drawn from the grid after solar generation, never negative.
    pub fn grid_kwh(&self) -> f64 {
        (self.consumo_kwh - self.solar_kwh).max(0.0)
    }
}

impl fmt::Display for OfficeTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "consumo={:.2}kWh solar={:.2}kWh red={:.2}kWh bateria={}% ahorro={}%",
            self.consumo_kwh,
            self.solar_kwh,
            self.grid_kwh(),
            self.bateria_porcentaje,
            self.savings_percent,
        )
    }
}

/// One retained reading as returned by the query API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingView {
    pub id: i64,
    /// Receipt time in milliseconds since the Unix epoch.
    pub ts: i64,
    pub topic: String,
    pub data: Value,
}

impl ReadingView {
    /// Typed view of `data`, if it follows the office telemetry convention.
    pub fn telemetry(&self) -> Option<OfficeTelemetry> {
        serde_json::from_value(self.data.clone()).ok()
    }
}
