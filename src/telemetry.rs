//! Telemetry Normalizer Module
//!
//! Pure transformations from raw backend payloads into canonical fleet
//! units and alerts, including anomaly classification. No I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Motor temperature at or above this is a critical anomaly.
pub const TEMP_CRITICAL_C: f64 = 90.0;
/// Motor temperature at or above this (but below critical) is a warning.
pub const TEMP_WARNING_C: f64 = 85.0;

/// Placeholder for missing display components.
const MISSING: &str = "—";

/// Vehicle class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    Ground,
    Air,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Ground => write!(f, "Ground"),
            UnitKind::Air => write!(f, "Air"),
        }
    }
}

/// Unit status labels as shown in the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStatus {
    Unknown,
    #[serde(rename = "In Transit")]
    InTransit,
    Warning,
    Critical,
    Charging,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::Unknown => write!(f, "Unknown"),
            UnitStatus::InTransit => write!(f, "In Transit"),
            UnitStatus::Warning => write!(f, "Warning"),
            UnitStatus::Critical => write!(f, "Critical"),
            UnitStatus::Charging => write!(f, "Charging"),
        }
    }
}

/// Accept any JSON value, keeping it only when it is a number.
fn lenient_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(value.as_f64())
}

/// Accept any JSON value, keeping strings as-is and numbers stringified.
fn lenient_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(de)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// One raw fleet entry as the backend sends it. Every field is optional;
/// a present-but-wrong-typed field reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFleetUnit {
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub motor_temp_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub soc_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub speed_kph: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub lon: Option<f64>,
}

/// One raw alert entry as the backend sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAlert {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unit_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub alert_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ts: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub window_end: Option<String>,
    #[serde(default, rename = "_batch", deserialize_with = "lenient_string")]
    pub batch: Option<String>,
}

/// Canonical, UI-ready representation of one vehicle's latest telemetry.
/// Recomputed on every poll tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetUnit {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: UnitKind,
    pub status: UnitStatus,
    pub location: String,
    pub telemetry: String,
    pub anomaly: bool,
    #[serde(rename = "isEV")]
    pub is_ev: bool,
    pub raw: RawFleetUnit,
}

/// Canonical, UI-ready representation of one anomaly event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub unit_id: String,
    pub severity: String,
    pub title: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub raw: RawAlert,
}

/// Classify status and anomaly from motor temperature.
///
/// Strict ordered ladder; the first matching band wins.
pub fn classify_status(motor_temp_c: Option<f64>) -> (UnitStatus, bool) {
    match motor_temp_c {
        None => (UnitStatus::Unknown, false),
        Some(t) if t >= TEMP_CRITICAL_C => (UnitStatus::Critical, true),
        Some(t) if t >= TEMP_WARNING_C => (UnitStatus::Warning, true),
        Some(_) => (UnitStatus::InTransit, false),
    }
}

fn format_location(lat: Option<f64>, lon: Option<f64>) -> String {
    match (lat, lon) {
        (Some(lat), Some(lon)) => format!("{lat:.4}, {lon:.4}"),
        _ => MISSING.to_string(),
    }
}

fn format_telemetry(temp: Option<f64>, soc: Option<f64>, speed: Option<f64>) -> String {
    let temp_text = temp.map_or(MISSING.to_string(), |t| format!("{t:.1}°C"));
    let soc_text = soc.map_or(MISSING.to_string(), |s| format!("{s:.0}%"));
    let speed_text = speed.map_or(MISSING.to_string(), |s| format!("{s:.0} kph"));
    format!("Temp: {temp_text} • SOC: {soc_text} • {speed_text}")
}

/// Human names / class / EV flag for the known fleet; anything else gets a
/// generic label.
fn unit_label(id: &str) -> (String, UnitKind, bool) {
    match id {
        "ECO-101" => ("EcoStream EV Truck 101".to_string(), UnitKind::Ground, true),
        "ECO-102" => ("EcoStream EV Truck 102".to_string(), UnitKind::Ground, true),
        "ECO-103" => ("EcoStream EV Van 103".to_string(), UnitKind::Ground, true),
        "ECO-104" => ("EcoStream EV Van 104".to_string(), UnitKind::Ground, true),
        other => (format!("Unit {other}"), UnitKind::Ground, true),
    }
}

fn resolved_id(primary: Option<&str>, fallback: Option<&str>) -> Option<String> {
    let id = primary.or(fallback)?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalize the `units` field of the fleet payload.
///
/// A missing or non-array value yields an empty list; entries without a
/// resolvable id are dropped.
pub fn normalize_fleet_units(units: Option<&Value>) -> Vec<FleetUnit> {
    let Some(entries) = units.and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let raw: RawFleetUnit = serde_json::from_value(entry.clone()).unwrap_or_default();
            let id = resolved_id(raw.unit_id.as_deref(), raw.id.as_deref())?;

            let (name, kind, is_ev) = unit_label(&id);
            let (status, anomaly) = classify_status(raw.motor_temp_c);

            Some(FleetUnit {
                id,
                name,
                kind,
                status,
                location: format_location(raw.lat, raw.lon),
                telemetry: format_telemetry(raw.motor_temp_c, raw.soc_pct, raw.speed_kph),
                anomaly,
                is_ev,
                raw,
            })
        })
        .collect()
}

/// Normalize the `alerts` field of the alerts payload.
///
/// Entries without a resolvable `unit_id` are dropped. The creation time
/// parses `ts`, then `window_end`, and falls back to now; results are
/// ordered newest first by timestamp.
pub fn normalize_alerts(alerts: Option<&Value>) -> Vec<Alert> {
    let Some(entries) = alerts.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut alerts: Vec<Alert> = entries
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            let raw: RawAlert = serde_json::from_value(entry.clone()).unwrap_or_default();
            let unit_id = resolved_id(raw.unit_id.as_deref(), None)?;

            let created_at = parse_timestamp(raw.ts.as_deref())
                .or_else(|| parse_timestamp(raw.window_end.as_deref()))
                .unwrap_or_else(Utc::now);

            let discriminator = raw.batch.clone().unwrap_or_else(|| idx.to_string());
            let id = raw
                .id
                .clone()
                .unwrap_or_else(|| format!("ALRT-{unit_id}-{discriminator}"));

            let alert_type = raw.alert_type.clone().unwrap_or_else(|| "ANOMALY".into());
            let summary = raw
                .message
                .clone()
                .or_else(|| raw.alert_type.clone())
                .unwrap_or_else(|| "Anomaly".into());

            Some(Alert {
                id,
                title: format!("{unit_id} {alert_type}"),
                severity: raw.severity.clone().unwrap_or_else(|| "HIGH".into()),
                summary,
                unit_id,
                created_at,
                raw,
            })
        })
        .collect();

    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    alerts
}
