//! Wire-message normalization
//!
//! Upstream producers disagree on field names (`lat` vs `latitude`, `gs` vs
//! `ground_speed`) and on types (squawk as number or string, altitude as
//! number or the literal `"ground"`). Every normalizer here is a pure
//! function over loose JSON: for each canonical attribute it probes a fixed
//! key list in priority order, takes the first non-null hit, and coerces it.
//! Canonical serialized names are the first probe key of each list, so
//! running a normalizer over its own output changes nothing.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::state::{
    AcarsMessage, Advisory, Aircraft, Airspace, AlertEvent, AudioTransmission, SafetyEvent,
    SafetyKind, SafetyUpdate, Severity, TrackSample,
};

/// First value present and non-null among `keys`
fn first_defined<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// Numeric probe; accepts JSON numbers and numeric strings
fn probe_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    match first_defined(obj, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String probe; trims, drops empties, stringifies bare numbers
fn probe_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first_defined(obj, keys)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Loose boolean: JSON bool, nonzero number, or a truthy/falsy word
fn value_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn probe_flag(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    first_defined(obj, keys).and_then(value_flag)
}

/// Epoch-millis probe; values that look like epoch seconds are scaled up
fn probe_ts_millis(obj: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    let n = probe_f64(obj, keys)?;
    Some(scale_ts(n))
}

fn scale_ts(n: f64) -> i64 {
    if n < 1.0e12 {
        (n * 1000.0) as i64
    } else {
        n as i64
    }
}

/// Transponder address: uppercase hex string, or a raw number rendered as
/// six hex digits
fn probe_hex(obj: &Map<String, Value>) -> Option<String> {
    match first_defined(obj, &["hex", "icao", "icao24", "addr"])? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_ascii_uppercase())
            }
        }
        Value::Number(n) => n.as_u64().map(|v| format!("{:06X}", v)),
        _ => None,
    }
}

/// Normalize one aircraft record; returns None when no address can be found
pub fn normalize_aircraft(value: &Value) -> Option<Aircraft> {
    let obj = value.as_object()?;
    let hex = probe_hex(obj)?;

    // "ground" altitude is a flag in disguise, not a number
    let alt_probe = first_defined(obj, &["alt_baro", "altitude", "alt"]);
    let grounded_by_alt = matches!(
        alt_probe,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("ground")
    );
    let alt_baro = if grounded_by_alt {
        None
    } else {
        match alt_probe {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    };

    let squawk = match first_defined(obj, &["squawk", "sqk"]) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(n)) => n.as_u64().map(|v| format!("{:04}", v)),
        _ => None,
    };

    // declared squawk-style emergency: any non-empty marker except "none"
    let emergency = first_defined(obj, &["emergency"]).map(|v| match v {
        Value::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("none")
        }
        other => value_flag(other).unwrap_or(false),
    });

    let military = probe_flag(obj, &["military", "mil"]).or_else(|| {
        obj.get("dbFlags")
            .and_then(Value::as_u64)
            .map(|flags| flags & 1 != 0)
    });

    let on_ground = probe_flag(obj, &["on_ground", "ground"]).or(if grounded_by_alt {
        Some(true)
    } else {
        None
    });

    Some(Aircraft {
        hex,
        flight: probe_string(obj, &["flight", "callsign", "cs"]),
        registration: probe_string(obj, &["registration", "reg", "r"]),
        aircraft_type: probe_string(obj, &["aircraft_type", "t"]),
        lat: probe_f64(obj, &["lat", "latitude"]),
        lon: probe_f64(obj, &["lon", "lng", "longitude"]),
        alt_baro,
        alt_geom: probe_f64(obj, &["alt_geom", "geom_alt", "gnss_alt"]),
        gs: probe_f64(obj, &["gs", "ground_speed", "speed"]),
        track: probe_f64(obj, &["track", "heading", "trk", "hdg"]),
        vr: probe_f64(obj, &["vr", "vertical_rate", "baro_rate", "geom_rate"]),
        squawk,
        emergency,
        military,
        on_ground,
        rssi: probe_f64(obj, &["rssi", "signal", "sig"]),
        seen: probe_f64(obj, &["seen", "seen_pos"]),
    })
}

/// Normalize a batch in either wire shape: a record array, or a map keyed
/// by hex. Records without an address are dropped; in map form the key
/// stands in for a missing `hex` field.
pub fn normalize_batch(value: &Value) -> HashMap<String, Aircraft> {
    let mut out = HashMap::new();
    match value {
        Value::Array(records) => {
            for record in records {
                if let Some(aircraft) = normalize_aircraft(record) {
                    out.insert(aircraft.hex.clone(), aircraft);
                }
            }
        }
        Value::Object(map) => {
            for (key, record) in map {
                let normalized = normalize_aircraft(record).or_else(|| {
                    record.as_object().and_then(|obj| {
                        let mut keyed = obj.clone();
                        keyed.insert("hex".to_string(), Value::String(key.clone()));
                        normalize_aircraft(&Value::Object(keyed))
                    })
                });
                if let Some(aircraft) = normalized {
                    out.insert(aircraft.hex.clone(), aircraft);
                }
            }
        }
        _ => {}
    }
    out
}

impl SafetyKind {
    /// Map a wire category string; unknown values fall through to `Other`
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tcas_ra" | "ra" | "resolution_advisory" => SafetyKind::TcasRa,
            "tcas_ta" | "ta" | "traffic_advisory" => SafetyKind::TcasTa,
            "extreme_vertical_speed" | "extreme_vs" => SafetyKind::ExtremeVerticalSpeed,
            "vs_reversal" | "vertical_speed_reversal" => SafetyKind::VerticalSpeedReversal,
            "proximity" | "proximity_conflict" | "conflict" => SafetyKind::ProximityConflict,
            "emergency_squawk" | "squawk_7700" | "emergency" => SafetyKind::EmergencySquawk,
            "hijack" | "hijack_squawk" | "squawk_7500" => SafetyKind::HijackSquawk,
            "radio_failure" | "radio_failure_squawk" | "squawk_7600" => {
                SafetyKind::RadioFailureSquawk
            }
            _ => SafetyKind::Other,
        }
    }

    /// Severity assumed when the wire omits one
    pub fn default_severity(self) -> Severity {
        match self {
            SafetyKind::TcasRa
            | SafetyKind::EmergencySquawk
            | SafetyKind::HijackSquawk
            | SafetyKind::RadioFailureSquawk => Severity::Critical,
            SafetyKind::TcasTa
            | SafetyKind::ExtremeVerticalSpeed
            | SafetyKind::VerticalSpeedReversal
            | SafetyKind::ProximityConflict => Severity::Warning,
            SafetyKind::Other => Severity::Info,
        }
    }
}

impl Severity {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" | "severe" | "high" => Some(Severity::Critical),
            "warning" | "warn" | "medium" => Some(Severity::Warning),
            "info" | "notice" | "low" => Some(Severity::Info),
            _ => None,
        }
    }
}

/// Involved aircraft: a hex array, an array of records, or a bare string
fn probe_aircraft_list(obj: &Map<String, Value>) -> Vec<String> {
    match first_defined(obj, &["aircraft", "hexes", "hex"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => {
                    Some(s.trim().to_ascii_uppercase())
                }
                Value::Object(entry) => probe_hex(entry),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            vec![s.trim().to_ascii_uppercase()]
        }
        _ => vec![],
    }
}

/// Hex keys named by a removal payload: a bare array, or a list under one
/// of the usual container keys
pub fn aircraft_keys(value: &Value) -> Vec<String> {
    fn keys_from(items: &[Value]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => {
                    Some(s.trim().to_ascii_uppercase())
                }
                Value::Object(entry) => probe_hex(entry),
                _ => None,
            })
            .collect()
    }

    match value {
        Value::Array(items) => keys_from(items),
        Value::Object(obj) => match first_defined(obj, &["hexes", "aircraft", "removed", "hex"])
        {
            Some(Value::Array(items)) => keys_from(items),
            Some(Value::String(s)) if !s.trim().is_empty() => {
                vec![s.trim().to_ascii_uppercase()]
            }
            _ => vec![],
        },
        _ => vec![],
    }
}

fn probe_details(obj: &Map<String, Value>, value: &Value) -> Value {
    first_defined(obj, &["details", "metadata"])
        .cloned()
        .unwrap_or_else(|| value.clone())
}

fn probe_id(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    probe_string(obj, keys)
}

/// Normalize one safety event; both id forms are kept so later updates can
/// address the event by either
pub fn normalize_safety_event(value: &Value) -> Option<SafetyEvent> {
    let obj = value.as_object()?;
    let id = probe_id(obj, &["id"]);
    let event_id = probe_id(obj, &["event_id"]);
    if id.is_none() && event_id.is_none() {
        return None;
    }

    let kind = probe_string(obj, &["kind", "type", "event_type"])
        .map(|s| SafetyKind::from_wire(&s))
        .unwrap_or(SafetyKind::Other);
    let severity = probe_string(obj, &["severity", "level"])
        .and_then(|s| Severity::from_wire(&s))
        .unwrap_or_else(|| kind.default_severity());
    let created_at = probe_ts_millis(obj, &["created_at", "timestamp", "ts", "time"]);

    Some(SafetyEvent {
        id,
        event_id,
        kind,
        severity,
        aircraft: probe_aircraft_list(obj),
        details: probe_details(obj, value),
        resolved: probe_flag(obj, &["resolved"]).unwrap_or(false),
        created_at,
        updated_at: probe_ts_millis(obj, &["updated_at"]).or(created_at),
    })
}

/// Normalize the partial fields of an update/resolve message
pub fn normalize_safety_update(value: &Value) -> SafetyUpdate {
    let Some(obj) = value.as_object() else {
        return SafetyUpdate::default();
    };
    SafetyUpdate {
        kind: probe_string(obj, &["kind", "type", "event_type"])
            .map(|s| SafetyKind::from_wire(&s)),
        severity: probe_string(obj, &["severity", "level"])
            .and_then(|s| Severity::from_wire(&s)),
        resolved: probe_flag(obj, &["resolved"]),
        aircraft: probe_aircraft_list(obj),
        details: first_defined(obj, &["details", "metadata"]).cloned(),
        updated_at: probe_ts_millis(obj, &["updated_at", "timestamp", "ts", "time"]),
    }
}

/// Ids an update message may use to address its target event, in match order
pub fn safety_update_keys(value: &Value) -> Vec<String> {
    let Some(obj) = value.as_object() else {
        return vec![];
    };
    let mut keys = Vec::new();
    if let Some(id) = probe_id(obj, &["id"]) {
        keys.push(id);
    }
    if let Some(event_id) = probe_id(obj, &["event_id"]) {
        if !keys.contains(&event_id) {
            keys.push(event_id);
        }
    }
    keys
}

pub fn normalize_alert(value: &Value) -> AlertEvent {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    let hex = probe_string(obj, &["hex", "icao"])
        .map(|s| s.to_ascii_uppercase())
        .or_else(|| probe_aircraft_list(obj).into_iter().next());
    AlertEvent {
        id: probe_id(obj, &["id", "alert_id"]),
        kind: probe_string(obj, &["kind", "type", "rule"]),
        hex,
        message: probe_string(obj, &["message", "text", "description"]),
        details: probe_details(obj, value),
        timestamp: probe_ts_millis(obj, &["timestamp", "ts", "time"]),
    }
}

pub fn normalize_acars(value: &Value) -> AcarsMessage {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    AcarsMessage {
        hex: probe_string(obj, &["hex", "icao"]).map(|s| s.to_ascii_uppercase()),
        flight: probe_string(obj, &["flight", "callsign", "tail"]),
        label: probe_string(obj, &["label", "msg_label"]),
        text: probe_string(obj, &["text", "message", "msg_text"]),
        timestamp: probe_ts_millis(obj, &["timestamp", "ts", "time"]),
    }
}

pub fn normalize_audio(value: &Value) -> AudioTransmission {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    // producers report hertz or megahertz; anything implausibly large is Hz
    let frequency_mhz = probe_f64(obj, &["frequency_mhz", "frequency", "freq"])
        .map(|f| if f > 100_000.0 { f / 1_000_000.0 } else { f });
    AudioTransmission {
        id: probe_id(obj, &["id", "transmission_id"]),
        frequency_mhz,
        duration_secs: probe_f64(obj, &["duration_secs", "duration", "length"]),
        hex: probe_string(obj, &["hex", "icao"]).map(|s| s.to_ascii_uppercase()),
        timestamp: probe_ts_millis(obj, &["timestamp", "ts", "time"]),
    }
}

/// Full-replacement airspace frame: the advisory list plus a stamp
pub fn normalize_airspace(value: &Value) -> Airspace {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    let advisories = match first_defined(obj, &["advisories", "notams", "items"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let entry = item.as_object()?;
                Some(Advisory {
                    id: probe_id(entry, &["id"]),
                    kind: probe_string(entry, &["kind", "type"]),
                    text: probe_string(entry, &["text", "message", "description"]),
                    details: item.clone(),
                })
            })
            .collect(),
        _ => vec![],
    };
    Airspace {
        advisories,
        updated_at: probe_ts_millis(obj, &["updated_at", "timestamp", "ts"]),
    }
}

/// Extract history samples from a track response; tolerates the container
/// key varying and skips malformed samples
pub fn parse_track(value: &Value) -> Vec<TrackSample> {
    let list = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match first_defined(obj, &["track", "samples", "points"]) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => return vec![],
        },
        _ => return vec![],
    };
    list.iter()
        .filter_map(|item| serde_json::from_value::<TrackSample>(item.clone()).ok())
        .map(|mut sample| {
            sample.ts = scale_ts(sample.ts as f64);
            sample
        })
        .collect()
}
