//! Canonical entity state owned by the feed engine
//!
//! One map entry per aircraft hex, bounded newest-first lists for event
//! streams, and a FIFO side-table for per-aircraft lookup failures. All
//! mutation goes through the engine's dispatch handlers; consumers read
//! cloned snapshots through the engine's accessor surface.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retained safety events (newest first)
pub const MAX_SAFETY_EVENTS: usize = 100;
/// Retained live alerts (newest first)
pub const MAX_ALERTS: usize = 100;
/// Retained ACARS messages (newest first)
pub const MAX_ACARS: usize = 100;
/// Retained audio transmissions (newest first)
pub const MAX_AUDIO: usize = 50;
/// Retained alert-history entries; unlike the live list this survives disconnects
pub const MAX_ALERT_HISTORY: usize = 1000;
/// Retained per-aircraft lookup failures
pub const MAX_LOOKUP_ERRORS: usize = 100;

/// Canonical aircraft record, keyed by uppercase hex address
///
/// Every attribute is optional: partial updates merge onto the existing
/// record and never null out fields the wire message left unspecified.
/// Serialized field names are the canonical wire names, so normalizing an
/// already-normalized record is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
    /// Uppercase transponder address
    pub hex: String,

    /// Flight callsign
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight: Option<String>,

    /// Tail registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,

    /// Airframe type designator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft_type: Option<String>,

    /// Latitude in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    /// Longitude in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,

    /// Barometric altitude in feet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_baro: Option<f64>,

    /// Geometric altitude in feet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_geom: Option<f64>,

    /// Ground speed in knots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gs: Option<f64>,

    /// Track over ground in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<f64>,

    /// Vertical rate in feet per minute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vr: Option<f64>,

    /// 4-digit transponder code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squawk: Option<String>,

    /// Declared emergency condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency: Option<bool>,

    /// Military operator flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub military: Option<bool>,

    /// On-ground flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_ground: Option<bool>,

    /// Signal strength in dBFS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<f64>,

    /// Seconds since the receiver last heard this aircraft
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seen: Option<f64>,
}

impl Aircraft {
    /// Merge a partial update onto this record; unspecified fields keep
    /// their prior values
    pub fn merge_from(&mut self, update: &Aircraft) {
        if update.flight.is_some() {
            self.flight = update.flight.clone();
        }
        if update.registration.is_some() {
            self.registration = update.registration.clone();
        }
        if update.aircraft_type.is_some() {
            self.aircraft_type = update.aircraft_type.clone();
        }
        if update.lat.is_some() {
            self.lat = update.lat;
        }
        if update.lon.is_some() {
            self.lon = update.lon;
        }
        if update.alt_baro.is_some() {
            self.alt_baro = update.alt_baro;
        }
        if update.alt_geom.is_some() {
            self.alt_geom = update.alt_geom;
        }
        if update.gs.is_some() {
            self.gs = update.gs;
        }
        if update.track.is_some() {
            self.track = update.track;
        }
        if update.vr.is_some() {
            self.vr = update.vr;
        }
        if update.squawk.is_some() {
            self.squawk = update.squawk.clone();
        }
        if update.emergency.is_some() {
            self.emergency = update.emergency;
        }
        if update.military.is_some() {
            self.military = update.military;
        }
        if update.on_ground.is_some() {
            self.on_ground = update.on_ground;
        }
        if update.rssi.is_some() {
            self.rssi = update.rssi;
        }
        if update.seen.is_some() {
            self.seen = update.seen;
        }
    }

    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

/// Safety event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyKind {
    /// TCAS resolution advisory
    TcasRa,
    /// TCAS traffic advisory
    TcasTa,
    ExtremeVerticalSpeed,
    VerticalSpeedReversal,
    ProximityConflict,
    /// Squawk 7700
    EmergencySquawk,
    /// Squawk 7500
    HijackSquawk,
    /// Squawk 7600
    RadioFailureSquawk,
    /// Unrecognized wire value; the raw payload stays in `details`
    Other,
}

/// Safety event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// A tracked safety event, mutated in place by update/resolve messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEvent {
    /// Primary id, when the wire carried one
    pub id: Option<String>,
    /// Alternate id some producers use instead
    pub event_id: Option<String>,
    pub kind: SafetyKind,
    pub severity: Severity,
    /// One or two involved aircraft hexes
    pub aircraft: Vec<String>,
    /// Free-form payload from the wire
    pub details: Value,
    pub resolved: bool,
    /// Epoch millis
    pub created_at: Option<i64>,
    /// Epoch millis of the latest update
    pub updated_at: Option<i64>,
}

impl SafetyEvent {
    /// True if `key` equals either of this event's ids
    pub fn matches_key(&self, key: &str) -> bool {
        self.id.as_deref() == Some(key) || self.event_id.as_deref() == Some(key)
    }

    /// Best available identifier for notifications
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().or(self.event_id.as_deref())
    }
}

/// Partial safety-event mutation carried by update/resolve messages
#[derive(Debug, Clone, Default)]
pub struct SafetyUpdate {
    pub kind: Option<SafetyKind>,
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub aircraft: Vec<String>,
    pub details: Option<Value>,
    pub updated_at: Option<i64>,
}

impl SafetyEvent {
    /// In-place field merge; object details merge shallowly, anything else
    /// replaces
    pub fn apply_update(&mut self, update: &SafetyUpdate) {
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(severity) = update.severity {
            self.severity = severity;
        }
        if let Some(resolved) = update.resolved {
            self.resolved = resolved;
        }
        if !update.aircraft.is_empty() {
            self.aircraft = update.aircraft.clone();
        }
        if let Some(details) = &update.details {
            match (self.details.as_object_mut(), details.as_object()) {
                (Some(current), Some(incoming)) => {
                    for (k, v) in incoming {
                        current.insert(k.clone(), v.clone());
                    }
                }
                _ => self.details = details.clone(),
            }
        }
        if update.updated_at.is_some() {
            self.updated_at = update.updated_at;
        }
    }
}

/// A triggered alert (newest first, capacity-bounded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Option<String>,
    /// Alert rule or category name
    pub kind: Option<String>,
    /// Involved aircraft hex
    pub hex: Option<String>,
    pub message: Option<String>,
    pub details: Value,
    /// Epoch millis
    pub timestamp: Option<i64>,
}

/// One ACARS message (newest first, capacity-bounded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcarsMessage {
    pub hex: Option<String>,
    pub flight: Option<String>,
    /// ACARS label code
    pub label: Option<String>,
    pub text: Option<String>,
    /// Epoch millis
    pub timestamp: Option<i64>,
}

/// One received audio transmission (newest first, capacity-bounded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTransmission {
    pub id: Option<String>,
    /// Receive frequency in MHz
    pub frequency_mhz: Option<f64>,
    pub duration_secs: Option<f64>,
    pub hex: Option<String>,
    /// Epoch millis
    pub timestamp: Option<i64>,
}

/// One airspace advisory overlay entry (NOTAM/PIREP style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: Option<String>,
    /// e.g. "notam", "pirep"
    pub kind: Option<String>,
    pub text: Option<String>,
    pub details: Value,
}

/// Airspace overlay state, replaced wholesale by `airspace:update`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Airspace {
    pub advisories: Vec<Advisory>,
    /// Epoch millis
    pub updated_at: Option<i64>,
}

/// One historical position sample
///
/// The query API delivers samples newest-first; replay reverses them once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude", alias = "lng")]
    pub lon: f64,
    /// Altitude in feet
    #[serde(default, alias = "altitude", alias = "alt_baro")]
    pub alt: Option<f64>,
    /// Ground speed in knots
    #[serde(default, alias = "ground_speed", alias = "speed")]
    pub gs: Option<f64>,
    /// Vertical rate in feet per minute
    #[serde(default, alias = "vertical_rate", alias = "baro_rate")]
    pub vr: Option<f64>,
    /// Track angle in degrees
    #[serde(default, alias = "heading")]
    pub track: Option<f64>,
    /// Epoch millis
    #[serde(alias = "timestamp", alias = "time")]
    pub ts: i64,
}

/// Bounded FIFO side-table of per-aircraft lookup failures
#[derive(Debug, Default)]
pub struct LookupErrors {
    entries: VecDeque<(String, String)>,
}

impl LookupErrors {
    /// Record a failure; a repeat for the same hex replaces the old entry
    pub fn insert(&mut self, hex: &str, message: &str) {
        self.entries.retain(|(h, _)| h != hex);
        self.entries.push_back((hex.to_string(), message.to_string()));
        while self.entries.len() > MAX_LOOKUP_ERRORS {
            self.entries.pop_front();
        }
    }

    pub fn get(&self, hex: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(h, _)| h == hex)
            .map(|(_, m)| m.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// All canonical containers, exclusively owned by the engine
#[derive(Debug, Default)]
pub struct FeedState {
    aircraft: HashMap<String, Aircraft>,
    /// True while the map holds synthetic demo data
    demo: bool,
    /// Server-reported aircraft count from heartbeats
    aircraft_count: Option<u64>,
    /// Epoch millis of the last heartbeat
    last_heartbeat: Option<i64>,

    safety: VecDeque<SafetyEvent>,
    alerts: VecDeque<AlertEvent>,
    alert_history: VecDeque<AlertEvent>,
    acars: VecDeque<AcarsMessage>,
    audio: VecDeque<AudioTransmission>,
    airspace: Airspace,

    lookup_errors: LookupErrors,
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    // --- aircraft map ---

    /// Replace the whole map with a live snapshot batch
    pub fn replace_aircraft(&mut self, batch: HashMap<String, Aircraft>) {
        self.aircraft = batch;
        self.demo = false;
    }

    /// Upsert-merge a live batch; synthetic leftovers are discarded first so
    /// demo and live entries never mix
    pub fn merge_aircraft(&mut self, batch: HashMap<String, Aircraft>) {
        if self.demo {
            self.aircraft.clear();
            self.demo = false;
        }
        for (hex, update) in batch {
            match self.aircraft.get_mut(&hex) {
                Some(existing) => existing.merge_from(&update),
                None => {
                    self.aircraft.insert(hex, update);
                }
            }
        }
    }

    /// Delete the listed hex keys; returns how many were present
    pub fn remove_aircraft(&mut self, hexes: &[String]) -> usize {
        if self.demo {
            self.aircraft.clear();
            self.demo = false;
            return 0;
        }
        hexes
            .iter()
            .filter(|hex| self.aircraft.remove(hex.as_str()).is_some())
            .count()
    }

    /// Scalar-only heartbeat update; the map itself is untouched
    pub fn set_heartbeat(&mut self, count: u64, timestamp: i64) {
        self.aircraft_count = Some(count);
        self.last_heartbeat = Some(timestamp);
    }

    /// Full live-position reset on transport loss
    pub fn clear_aircraft(&mut self) {
        self.aircraft.clear();
        self.aircraft_count = None;
        self.last_heartbeat = None;
        self.demo = false;
    }

    /// Overwrite the map with a synthetic batch, flagged as demo data
    pub fn apply_demo_snapshot(&mut self, batch: HashMap<String, Aircraft>, timestamp: i64) {
        self.aircraft_count = Some(batch.len() as u64);
        self.last_heartbeat = Some(timestamp);
        self.aircraft = batch;
        self.demo = true;
    }

    pub fn aircraft(&self) -> &HashMap<String, Aircraft> {
        &self.aircraft
    }

    pub fn aircraft_by_hex(&self, hex: &str) -> Option<&Aircraft> {
        self.aircraft.get(hex)
    }

    pub fn aircraft_len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn demo(&self) -> bool {
        self.demo
    }

    pub fn aircraft_count(&self) -> Option<u64> {
        self.aircraft_count
    }

    pub fn last_heartbeat(&self) -> Option<i64> {
        self.last_heartbeat
    }

    // --- safety events ---

    /// Replace the safety list with a snapshot, newest first
    pub fn replace_safety(&mut self, events: Vec<SafetyEvent>) {
        self.safety = events.into_iter().take(MAX_SAFETY_EVENTS).collect();
    }

    pub fn push_safety(&mut self, event: SafetyEvent) {
        self.safety.push_front(event);
        self.safety.truncate(MAX_SAFETY_EVENTS);
    }

    /// Find an event whose `id` or `event_id` equals `key`
    pub fn safety_mut_by_key(&mut self, key: &str) -> Option<&mut SafetyEvent> {
        self.safety.iter_mut().find(|e| e.matches_key(key))
    }

    pub fn safety(&self) -> Vec<SafetyEvent> {
        self.safety.iter().cloned().collect()
    }

    pub fn safety_len(&self) -> usize {
        self.safety.len()
    }

    // --- alert / acars / audio lists ---

    /// Prepend to the live list and the durable history, truncating both
    pub fn push_alert(&mut self, alert: AlertEvent) {
        self.alert_history.push_front(alert.clone());
        self.alert_history.truncate(MAX_ALERT_HISTORY);
        self.alerts.push_front(alert);
        self.alerts.truncate(MAX_ALERTS);
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.iter().cloned().collect()
    }

    pub fn alert_history(&self) -> Vec<AlertEvent> {
        self.alert_history.iter().cloned().collect()
    }

    pub fn push_acars(&mut self, message: AcarsMessage) {
        self.acars.push_front(message);
        self.acars.truncate(MAX_ACARS);
    }

    pub fn acars(&self) -> Vec<AcarsMessage> {
        self.acars.iter().cloned().collect()
    }

    pub fn push_audio(&mut self, transmission: AudioTransmission) {
        self.audio.push_front(transmission);
        self.audio.truncate(MAX_AUDIO);
    }

    pub fn audio(&self) -> Vec<AudioTransmission> {
        self.audio.iter().cloned().collect()
    }

    // --- airspace ---

    pub fn set_airspace(&mut self, airspace: Airspace) {
        self.airspace = airspace;
    }

    pub fn airspace(&self) -> &Airspace {
        &self.airspace
    }

    // --- lookup failures ---

    pub fn record_lookup_failure(&mut self, hex: &str, message: &str) {
        self.lookup_errors.insert(hex, message);
    }

    pub fn lookup_errors(&self) -> &LookupErrors {
        &self.lookup_errors
    }

    /// Summary counts for periodic logging
    pub fn stats(&self) -> FeedStats {
        FeedStats {
            aircraft: self.aircraft.len(),
            server_count: self.aircraft_count,
            safety_events: self.safety.len(),
            alerts: self.alerts.len(),
            acars: self.acars.len(),
            audio: self.audio.len(),
            demo: self.demo,
        }
    }
}

/// Point-in-time feed summary
#[derive(Debug, Clone, PartialEq)]
pub struct FeedStats {
    pub aircraft: usize,
    pub server_count: Option<u64>,
    pub safety_events: usize,
    pub alerts: usize,
    pub acars: usize,
    pub audio: usize,
    pub demo: bool,
}

impl std::fmt::Display for FeedStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Aircraft: {} tracked{}, safety: {}, alerts: {}, acars: {}, audio: {}{}",
            self.aircraft,
            match self.server_count {
                Some(n) => format!(" (server: {})", n),
                None => String::new(),
            },
            self.safety_events,
            self.alerts,
            self.acars,
            self.audio,
            if self.demo { " [demo]" } else { "" },
        )
    }
}
