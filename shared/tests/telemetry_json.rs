//! Wire-format checks for the documents shared with publishers and the
//! dashboard.

use serde_json::json;
use shared::{OfficeTelemetry, ReadingView};

#[test]
fn publisher_document_parses_into_telemetry() {
    let raw = r#"{
        "edificio": "Oficina Central",
        "timestamp": "2025-05-02T10:15:00.000Z",
        "consumo_kwh": 52.31,
        "solar_kwh": 12.5,
        "bateria_porcentaje": 61,
        "savings_percent": 14
    }"#;
    let t: OfficeTelemetry = serde_json::from_str(raw).unwrap();
    assert_eq!(t.edificio.as_deref(), Some("Oficina Central"));
    assert_eq!(t.bateria_porcentaje, 61);
    assert!((t.grid_kwh() - 39.81).abs() < 1e-9);
}

#[test]
fn grid_draw_is_clamped_at_zero() {
    let t = OfficeTelemetry {
        edificio: None,
        timestamp: None,
        consumo_kwh: 4.0,
        solar_kwh: 9.0,
        bateria_porcentaje: 80,
        savings_percent: 25,
    };
    assert_eq!(t.grid_kwh(), 0.0);
    assert!(t.to_string().contains("red=0.00kWh"));
}

#[test]
fn reading_view_serializes_with_dashboard_field_names() {
    let view = ReadingView {
        id: 7,
        ts: 1_700_000_000_000,
        topic: "greengrid/oficinas/data".into(),
        data: json!({ "consumo_kwh": 40.0 }),
    };
    let v = serde_json::to_value(&view).unwrap();
    assert_eq!(v["id"], 7);
    assert_eq!(v["ts"], 1_700_000_000_000_i64);
    assert_eq!(v["topic"], "greengrid/oficinas/data");
    assert_eq!(v["data"]["consumo_kwh"], 40.0);
}

#[test]
fn telemetry_view_is_none_for_foreign_documents() {
    let view = ReadingView {
        id: 1,
        ts: 0,
        topic: "t".into(),
        data: json!({ "temperature": 21 }),
    };
    assert!(view.telemetry().is_none());
}
