//! Feed engine: the single place transport events become state changes
//!
//! One task drains the transport event channel and dispatches frames
//! serially, so handlers never race each other and every message sees the
//! complete effect of the previous one. Consumers read cloned snapshots
//! through accessors, watch the connection status, or subscribe to the
//! engine event broadcast.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::FeedError;
use crate::normalize;
use crate::protocol::{InboundFrame, OutboundFrame};
use crate::requests::RequestTracker;
use crate::state::{
    Aircraft, Airspace, AlertEvent, AcarsMessage, AudioTransmission, FeedState, FeedStats,
    SafetyEvent, TrackSample,
};
use crate::subscriptions::SubscriptionManager;
use crate::transport::{ConnectionStatus, DisconnectReason, FrameSink, TransportEvent};

/// Broadcast notifications for things a dashboard wants to react to
/// immediately rather than poll for
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Connection(ConnectionStatus),
    SafetyUpdated { key: String, resolved: bool },
    AlertTriggered(AlertEvent),
}

/// Shared sync/replay engine handle
pub struct FeedEngine {
    config: Config,
    state: RwLock<FeedState>,
    subscriptions: Mutex<SubscriptionManager>,
    requests: RequestTracker,
    sink: FrameSink,
    status_tx: watch::Sender<ConnectionStatus>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl FeedEngine {
    pub fn new(config: Config, sink: FrameSink) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            requests: RequestTracker::new(),
            config,
            state: RwLock::new(FeedState::new()),
            subscriptions: Mutex::new(SubscriptionManager::new()),
            sink,
            status_tx,
            events_tx,
        })
    }

    /// Drain transport events until the channel closes
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("transport event channel closed, engine loop ending");
    }

    /// Apply one transport event; dispatch is fully synchronous
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected { reason } => self.on_disconnected(&reason),
            TransportEvent::Frame(text) => match InboundFrame::parse(&text) {
                Ok(frame) => {
                    if let Err(err) = self.dispatch(&frame) {
                        warn!("dropping {} frame: {}", frame.frame_type, err);
                    }
                }
                Err(err) => warn!("unparseable frame: {}", err),
            },
        }
    }

    fn on_connected(&self) {
        let topics: Vec<String> = {
            let mut subs = self.subscriptions.lock().unwrap();
            let mut desired: BTreeSet<String> = subs.wanted().into_iter().collect();
            desired.extend(self.config.topics.iter().cloned());
            let desired: Vec<String> = desired.into_iter().collect();
            subs.subscribe(&desired);
            desired
        };
        info!(topics = topics.len(), "feed connected, requesting subscriptions");
        let _ = self.status_tx.send(ConnectionStatus::Connected);
        self.send(OutboundFrame::Subscribe { topics });
        let _ = self
            .events_tx
            .send(EngineEvent::Connection(ConnectionStatus::Connected));
    }

    fn on_disconnected(&self, reason: &DisconnectReason) {
        warn!("feed disconnected: {}", reason);
        self.state.write().unwrap().clear_aircraft();
        let failed = self.requests.clear_all(&reason.to_string());
        if failed > 0 {
            debug!(requests = failed, "failed in-flight requests on disconnect");
        }
        self.subscriptions.lock().unwrap().reset_for_reconnect();
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
        let _ = self
            .events_tx
            .send(EngineEvent::Connection(ConnectionStatus::Disconnected));
    }

    fn dispatch(&self, frame: &InboundFrame) -> Result<(), FeedError> {
        match frame.frame_type.as_str() {
            "aircraft:snapshot" => {
                let payload =
                    aircraft_payload(frame).ok_or(FeedError::Shape("aircraft:snapshot"))?;
                let batch = normalize::normalize_batch(&payload);
                debug!(aircraft = batch.len(), "applying aircraft snapshot");
                self.state.write().unwrap().replace_aircraft(batch);
            }
            "aircraft:update" | "aircraft:new" => {
                let batch = match aircraft_payload(frame) {
                    Some(payload) => normalize::normalize_batch(&payload),
                    // single flattened record with no data envelope
                    None => match normalize::normalize_aircraft(&Value::Object(
                        frame.body.clone(),
                    )) {
                        Some(aircraft) => {
                            HashMap::from([(aircraft.hex.clone(), aircraft)])
                        }
                        None => return Err(FeedError::Shape("aircraft:update")),
                    },
                };
                self.state.write().unwrap().merge_aircraft(batch);
            }
            "aircraft:remove" => {
                let hexes = normalize::aircraft_keys(&frame_payload(frame));
                if hexes.is_empty() {
                    return Err(FeedError::Shape("aircraft:remove"));
                }
                let removed = self.state.write().unwrap().remove_aircraft(&hexes);
                debug!(requested = hexes.len(), removed, "removed stale aircraft");
            }
            "aircraft:heartbeat" => {
                let payload = frame_payload(frame);
                let obj = payload.as_object();
                let count = obj
                    .and_then(|o| {
                        ["count", "aircraft_count", "total"]
                            .iter()
                            .filter_map(|k| o.get(*k))
                            .find_map(Value::as_u64)
                    })
                    .ok_or(FeedError::Shape("aircraft:heartbeat"))?;
                let timestamp = obj
                    .and_then(|o| {
                        ["timestamp", "ts", "time"]
                            .iter()
                            .filter_map(|k| o.get(*k))
                            .find_map(Value::as_i64)
                    })
                    .unwrap_or_else(|| Utc::now().timestamp_millis());
                self.state.write().unwrap().set_heartbeat(count, timestamp);
            }
            "safety:snapshot" => {
                let payload = frame_payload(frame);
                let list = payload
                    .as_array()
                    .or_else(|| payload.get("events").and_then(Value::as_array))
                    .ok_or(FeedError::Shape("safety:snapshot"))?;
                let events: Vec<SafetyEvent> = list
                    .iter()
                    .filter_map(normalize::normalize_safety_event)
                    .collect();
                debug!(events = events.len(), "applying safety snapshot");
                self.state.write().unwrap().replace_safety(events);
            }
            "safety:event" => {
                let payload = frame_payload(frame);
                let event = normalize::normalize_safety_event(&payload)
                    .ok_or(FeedError::Shape("safety:event"))?;
                let key = event.key().unwrap_or_default().to_string();
                let resolved = event.resolved;
                self.state.write().unwrap().push_safety(event);
                let _ = self
                    .events_tx
                    .send(EngineEvent::SafetyUpdated { key, resolved });
            }
            "safety:event_updated" => self.apply_safety_update(frame, false)?,
            "safety:event_resolved" => self.apply_safety_update(frame, true)?,
            "alert:triggered" => {
                let alert = normalize::normalize_alert(&frame_payload(frame));
                self.state.write().unwrap().push_alert(alert.clone());
                let _ = self.events_tx.send(EngineEvent::AlertTriggered(alert));
            }
            "acars:message" => {
                let message = normalize::normalize_acars(&frame_payload(frame));
                self.state.write().unwrap().push_acars(message);
            }
            "audio:transmission" => {
                let transmission = normalize::normalize_audio(&frame_payload(frame));
                self.state.write().unwrap().push_audio(transmission);
            }
            "airspace:update" => {
                let airspace = normalize::normalize_airspace(&frame_payload(frame));
                debug!(advisories = airspace.advisories.len(), "airspace replaced");
                self.state.write().unwrap().set_airspace(airspace);
            }
            "response" => {
                let id = frame.request_id().ok_or(FeedError::Shape("response"))?;
                let payload = frame.data().cloned().unwrap_or(Value::Null);
                if !self.requests.resolve(id, payload) {
                    debug!(request_id = id, "response for unknown or settled request");
                }
            }
            "error" => {
                let message = frame
                    .error_message()
                    .unwrap_or("unspecified server error")
                    .to_string();
                match frame.request_id() {
                    Some(id) => {
                        if !self.requests.reject(id, FeedError::Server(message.clone())) {
                            debug!(request_id = id, "error for unknown or settled request");
                        }
                    }
                    None => warn!("server error: {}", message),
                }
            }
            "subscribed" => {
                let topics = frame.topics();
                if topics.is_empty() {
                    debug!("subscribe ack without topic list");
                } else {
                    info!(?topics, "subscriptions confirmed");
                    self.subscriptions
                        .lock()
                        .unwrap()
                        .confirm_subscription(&topics);
                }
            }
            "unsubscribed" => {
                let topics = frame.topics();
                if !topics.is_empty() {
                    info!(?topics, "unsubscriptions confirmed");
                    self.subscriptions
                        .lock()
                        .unwrap()
                        .confirm_unsubscription(&topics);
                }
            }
            "batch" => {
                let messages = frame.messages().ok_or(FeedError::Shape("batch"))?;
                for message in messages.clone() {
                    // one bad element must not poison the rest
                    match InboundFrame::from_value(message) {
                        Ok(inner) => {
                            if let Err(err) = self.dispatch(&inner) {
                                warn!("dropping batched {} frame: {}", inner.frame_type, err);
                            }
                        }
                        Err(err) => warn!("unparseable batched frame: {}", err),
                    }
                }
            }
            "pong" => debug!("pong"),
            other => debug!(frame_type = other, "ignoring unknown frame type"),
        }
        Ok(())
    }

    /// Shared path for update and resolve messages; `force_resolved` marks
    /// the event resolved even when the payload does not say so
    fn apply_safety_update(
        &self,
        frame: &InboundFrame,
        force_resolved: bool,
    ) -> Result<(), FeedError> {
        let payload = frame_payload(frame);
        let keys = normalize::safety_update_keys(&payload);
        if keys.is_empty() {
            return Err(FeedError::Shape("safety update"));
        }
        let mut update = normalize::normalize_safety_update(&payload);
        if force_resolved {
            update.resolved = Some(true);
        }

        let matched = {
            let mut state = self.state.write().unwrap();
            let mut matched = None;
            for key in &keys {
                if let Some(event) = state.safety_mut_by_key(key) {
                    event.apply_update(&update);
                    matched = Some((key.clone(), event.resolved));
                    break;
                }
            }
            matched
        };

        match matched {
            Some((key, resolved)) => {
                let _ = self
                    .events_tx
                    .send(EngineEvent::SafetyUpdated { key, resolved });
            }
            None => debug!(?keys, "update for unknown safety event dropped"),
        }
        Ok(())
    }

    // --- outbound API ---

    fn send(&self, frame: OutboundFrame) {
        self.sink.send_text(frame.to_text());
    }

    /// Request additional topics; a frame goes out only for topics not
    /// already subscribed or in flight
    pub fn subscribe(&self, topics: &[String]) {
        let requested = self.subscriptions.lock().unwrap().subscribe(topics);
        if requested.is_empty() {
            return;
        }
        if self.is_connected() {
            self.send(OutboundFrame::Subscribe { topics: requested });
        } else {
            debug!(?requested, "subscribe deferred until reconnect");
        }
    }

    /// Drop topics; unknown topics are ignored
    pub fn unsubscribe(&self, topics: &[String]) {
        let requested = self.subscriptions.lock().unwrap().unsubscribe(topics);
        if requested.is_empty() {
            return;
        }
        if self.is_connected() {
            self.send(OutboundFrame::Unsubscribe { topics: requested });
        }
    }

    /// Application-level keepalive
    pub fn ping(&self) {
        if self.is_connected() {
            self.send(OutboundFrame::Ping);
        }
    }

    /// Send a correlated request and await its response, server error, or
    /// timeout, using the configured default timeout
    pub async fn request(&self, request_type: &str, params: Value) -> Result<Value, FeedError> {
        self.request_with_timeout(request_type, params, self.config.request_timeout)
            .await
    }

    /// Like [`request`](Self::request), with a caller-chosen timeout
    pub async fn request_with_timeout(
        &self,
        request_type: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, FeedError> {
        if !self.is_connected() {
            return Err(FeedError::NotConnected);
        }
        let (id, rx) = self.requests.create(timeout);
        self.send(OutboundFrame::Request {
            request_type: request_type.to_string(),
            request_id: id,
            params,
        });
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Canceled),
        }
    }

    /// Fetch an aircraft's position history; failures land in the lookup
    /// error table so the UI can annotate the aircraft
    pub async fn fetch_track(&self, hex: &str) -> Result<Vec<TrackSample>, FeedError> {
        let hex = hex.trim().to_ascii_uppercase();
        match self.request("aircraft:track", json!({ "hex": hex })).await {
            Ok(value) => Ok(normalize::parse_track(&value)),
            Err(err) => {
                self.state
                    .write()
                    .unwrap()
                    .record_lookup_failure(&hex, &err.to_string());
                Err(err)
            }
        }
    }

    /// Install a synthetic fleet snapshot; refused while live data flows
    pub fn apply_demo_snapshot(&self, batch: HashMap<String, Aircraft>) -> bool {
        if self.is_connected() {
            return false;
        }
        self.state
            .write()
            .unwrap()
            .apply_demo_snapshot(batch, Utc::now().timestamp_millis());
        true
    }

    /// Fail outstanding work so awaiting callers return promptly
    pub fn shutdown(&self) {
        let failed = self.requests.clear_all("shutting down");
        if failed > 0 {
            info!(requests = failed, "cancelled in-flight requests");
        }
        self.subscriptions.lock().unwrap().clear_all();
        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
    }

    // --- read surface ---

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Watch channel for connection status transitions
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Subscribe to engine notifications
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    /// All tracked aircraft, sorted by hex
    pub fn aircraft(&self) -> Vec<Aircraft> {
        let state = self.state.read().unwrap();
        let mut list: Vec<Aircraft> = state.aircraft().values().cloned().collect();
        list.sort_by(|a, b| a.hex.cmp(&b.hex));
        list
    }

    pub fn aircraft_by_hex(&self, hex: &str) -> Option<Aircraft> {
        self.state
            .read()
            .unwrap()
            .aircraft_by_hex(&hex.trim().to_ascii_uppercase())
            .cloned()
    }

    pub fn aircraft_count(&self) -> Option<u64> {
        self.state.read().unwrap().aircraft_count()
    }

    pub fn safety_events(&self) -> Vec<SafetyEvent> {
        self.state.read().unwrap().safety()
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.state.read().unwrap().alerts()
    }

    pub fn alert_history(&self) -> Vec<AlertEvent> {
        self.state.read().unwrap().alert_history()
    }

    pub fn acars_messages(&self) -> Vec<AcarsMessage> {
        self.state.read().unwrap().acars()
    }

    pub fn audio_transmissions(&self) -> Vec<AudioTransmission> {
        self.state.read().unwrap().audio()
    }

    pub fn airspace(&self) -> Airspace {
        self.state.read().unwrap().airspace().clone()
    }

    pub fn demo_active(&self) -> bool {
        self.state.read().unwrap().demo()
    }

    pub fn lookup_error(&self, hex: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .lookup_errors()
            .get(&hex.trim().to_ascii_uppercase())
            .map(str::to_string)
    }

    pub fn lookup_errors(&self) -> Vec<(String, String)> {
        self.state.read().unwrap().lookup_errors().entries()
    }

    pub fn active_topics(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().active()
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.pending_count()
    }

    pub fn stats(&self) -> FeedStats {
        self.state.read().unwrap().stats()
    }
}

/// Message body: the `data` envelope when present, else the flattened fields
fn frame_payload(frame: &InboundFrame) -> Value {
    match frame.data() {
        Some(data) => data.clone(),
        None => Value::Object(frame.body.clone()),
    }
}

/// Aircraft batch payload: `data`, a bare `aircraft` field, or `data.aircraft`
fn aircraft_payload(frame: &InboundFrame) -> Option<Value> {
    let data = frame
        .data()
        .or_else(|| frame.body.get("aircraft").filter(|v| !v.is_null()))?;
    if let Some(inner) = data.get("aircraft") {
        if inner.is_array() || inner.is_object() {
            return Some(inner.clone());
        }
    }
    Some(data.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (Arc<FeedEngine>, mpsc::UnboundedReceiver<String>) {
        let (sink, wire) = FrameSink::channel();
        (FeedEngine::new(Config::default(), sink), wire)
    }

    fn text_frame(value: Value) -> TransportEvent {
        TransportEvent::Frame(value.to_string())
    }

    fn connect(engine: &FeedEngine, wire: &mut mpsc::UnboundedReceiver<String>) {
        engine.handle_event(TransportEvent::Connected);
        // consume the subscription frame sent on connect
        let _ = wire.try_recv();
    }

    #[tokio::test]
    async fn test_connect_sends_configured_topics() {
        let (engine, mut wire) = engine();
        engine.handle_event(TransportEvent::Connected);

        let sent: Value = serde_json::from_str(&wire.recv().await.unwrap()).unwrap();
        assert_eq!(sent["action"], "subscribe");
        let topics: Vec<&str> = sent["topics"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(topics.contains(&"aircraft"));
        assert!(topics.contains(&"airspace"));
        assert!(engine.is_connected());
    }

    #[tokio::test]
    async fn test_snapshot_replaces_and_update_merges() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "aircraft:snapshot",
            "data": [
                {"hex": "a1b2c3", "flight": "UAL123", "alt_baro": 35000},
                {"hex": "c0ffee", "lat": 37.6, "lon": -122.4},
            ],
        })));
        assert_eq!(engine.aircraft().len(), 2);

        engine.handle_event(text_frame(json!({
            "type": "aircraft:update",
            "data": [
                {"hex": "a1b2c3", "gs": 440},
                {"hex": "d00d00", "lat": 1.0, "lon": 2.0},
            ],
        })));

        let aircraft = engine.aircraft();
        assert_eq!(aircraft.len(), 3);
        let merged = engine.aircraft_by_hex("A1B2C3").unwrap();
        assert_eq!(merged.flight.as_deref(), Some("UAL123"));
        assert_eq!(merged.gs, Some(440.0));
    }

    #[tokio::test]
    async fn test_flattened_single_update() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "aircraft:update",
            "hex": "a1b2c3",
            "lat": 37.6,
            "lon": -122.4,
        })));
        assert!(engine.aircraft_by_hex("a1b2c3").unwrap().has_position());
    }

    #[tokio::test]
    async fn test_remove_and_heartbeat() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "aircraft:snapshot",
            "data": [{"hex": "a1b2c3"}, {"hex": "c0ffee"}],
        })));
        engine.handle_event(text_frame(json!({
            "type": "aircraft:remove",
            "data": {"hexes": ["a1b2c3"]},
        })));
        assert_eq!(engine.aircraft().len(), 1);

        engine.handle_event(text_frame(json!({
            "type": "aircraft:heartbeat",
            "count": 3210,
            "timestamp": 1_700_000_000_000i64,
        })));
        assert_eq!(engine.aircraft_count(), Some(3210));
        assert_eq!(engine.aircraft().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_clears_positions_keeps_events() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "aircraft:snapshot",
            "data": [{"hex": "a1b2c3"}],
        })));
        engine.handle_event(text_frame(json!({
            "type": "alert:triggered",
            "data": {"id": "al-1", "message": "military traffic"},
        })));
        engine.handle_event(text_frame(json!({
            "type": "safety:event",
            "data": {"id": "ev-1", "type": "tcas_ra"},
        })));

        engine.handle_event(TransportEvent::Disconnected {
            reason: DisconnectReason::Closed,
        });

        assert!(!engine.is_connected());
        assert!(engine.aircraft().is_empty());
        assert_eq!(engine.aircraft_count(), None);
        assert_eq!(engine.safety_events().len(), 1);
        assert_eq!(engine.alert_history().len(), 1);
    }

    #[tokio::test]
    async fn test_request_resolved_by_response() {
        let (engine, mut wire) = engine();
        engine.handle_event(TransportEvent::Connected);
        let _ = wire.recv().await.unwrap();

        let requester = Arc::clone(&engine);
        let task = tokio::spawn(async move {
            requester.request("status:get", json!({})).await
        });

        let sent: Value = serde_json::from_str(&wire.recv().await.unwrap()).unwrap();
        assert_eq!(sent["action"], "request");
        assert_eq!(sent["type"], "status:get");
        let id = sent["request_id"].as_str().unwrap().to_string();
        assert!(id.starts_with("req_"));

        engine.handle_event(text_frame(json!({
            "type": "response",
            "request_id": id,
            "data": {"ok": true},
        })));

        let result = task.await.unwrap().unwrap();
        assert_eq!(result["ok"], true);
        assert_eq!(engine.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_request_rejected_by_server_error() {
        let (engine, mut wire) = engine();
        engine.handle_event(TransportEvent::Connected);
        let _ = wire.recv().await.unwrap();

        let requester = Arc::clone(&engine);
        let task = tokio::spawn(async move {
            requester.fetch_track("a1b2c3").await
        });

        let sent: Value = serde_json::from_str(&wire.recv().await.unwrap()).unwrap();
        assert_eq!(sent["params"]["hex"], "A1B2C3");
        let id = sent["request_id"].as_str().unwrap().to_string();

        engine.handle_event(text_frame(json!({
            "type": "error",
            "request_id": id,
            "message": "no history for aircraft",
        })));

        let result = task.await.unwrap();
        assert!(matches!(result, Err(FeedError::Server(_))));
        assert_eq!(
            engine.lookup_error("a1b2c3").as_deref(),
            Some("server error: no history for aircraft")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_chosen_timeout_overrides_default() {
        let (engine, mut wire) = engine();
        engine.handle_event(TransportEvent::Connected);
        let _ = wire.recv().await.unwrap();

        // well under the 10 s configured default
        let result = engine
            .request_with_timeout("status:get", json!({}), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(FeedError::Timeout)));
        assert_eq!(engine.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_request_while_disconnected_fails_fast() {
        let (engine, _wire) = engine();
        let result = engine.request("status:get", json!({})).await;
        assert!(matches!(result, Err(FeedError::NotConnected)));
        assert_eq!(engine.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_timeout_recorded_as_lookup_error() {
        let (engine, mut wire) = engine();
        engine.handle_event(TransportEvent::Connected);
        let _ = wire.recv().await.unwrap();

        let result = engine.fetch_track("c0ffee").await;
        assert!(matches!(result, Err(FeedError::Timeout)));
        assert_eq!(
            engine.lookup_error("C0FFEE").as_deref(),
            Some("request timed out")
        );
    }

    #[tokio::test]
    async fn test_batch_isolates_bad_elements() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "batch",
            "messages": [
                {"malformed": true},
                {"type": "aircraft:update", "data": [{"hex": "a1b2c3", "gs": 400}]},
                {"type": "mystery:frame"},
                {"type": "acars:message", "data": {"hex": "a1b2c3", "text": "WX REQ"}},
            ],
        })));

        assert_eq!(engine.aircraft().len(), 1);
        assert_eq!(engine.acars_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_ack_updates_active_topics() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);
        assert!(engine.active_topics().is_empty());

        engine.handle_event(text_frame(json!({
            "type": "subscribed",
            "topics": ["aircraft", "safety"],
        })));
        assert_eq!(engine.active_topics(), vec!["aircraft", "safety"]);

        engine.handle_event(text_frame(json!({
            "type": "unsubscribed",
            "topics": ["safety"],
        })));
        assert_eq!(engine.active_topics(), vec!["aircraft"]);
    }

    #[tokio::test]
    async fn test_reconnect_replays_confirmed_topics() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.subscribe(&["weather".to_string()]);
        let _ = wire.try_recv();
        engine.handle_event(text_frame(json!({
            "type": "subscribed",
            "topics": ["weather"],
        })));

        engine.handle_event(TransportEvent::Disconnected {
            reason: DisconnectReason::Closed,
        });
        engine.handle_event(TransportEvent::Connected);

        let sent: Value = serde_json::from_str(&wire.recv().await.unwrap()).unwrap();
        assert_eq!(sent["action"], "subscribe");
        let topics: Vec<&str> = sent["topics"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(topics.contains(&"weather"));
        assert!(topics.contains(&"aircraft"));
    }

    #[tokio::test]
    async fn test_safety_resolve_matches_either_id() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);
        let mut events = engine.events();

        engine.handle_event(text_frame(json!({
            "type": "safety:event",
            "data": {"event_id": "ev-7", "type": "proximity", "aircraft": ["a1b2c3", "c0ffee"]},
        })));
        engine.handle_event(text_frame(json!({
            "type": "safety:event_resolved",
            "data": {"id": "ev-7"},
        })));

        let event = &engine.safety_events()[0];
        assert!(event.resolved);

        let mut saw_resolution = false;
        while let Ok(notification) = events.try_recv() {
            if let EngineEvent::SafetyUpdated { key, resolved } = notification {
                if key == "ev-7" && resolved {
                    saw_resolution = true;
                }
            }
        }
        assert!(saw_resolution);
    }

    #[tokio::test]
    async fn test_unmatched_safety_update_is_dropped() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "safety:event",
            "data": {"id": "ev-1", "type": "proximity"},
        })));
        // self-sufficient payload, but no event with this id exists
        engine.handle_event(text_frame(json!({
            "type": "safety:event_updated",
            "data": {"id": "ev-404", "type": "tcas_ra", "severity": "critical"},
        })));

        let events = engine.safety_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("ev-1"));
    }

    #[tokio::test]
    async fn test_safety_update_merges_fields() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "safety:event",
            "data": {
                "id": "ev-9",
                "type": "proximity",
                "severity": "warning",
                "details": {"separation_nm": 2.0},
            },
        })));
        engine.handle_event(text_frame(json!({
            "type": "safety:event_updated",
            "data": {
                "id": "ev-9",
                "severity": "critical",
                "details": {"separation_nm": 0.9, "closing": true},
            },
        })));

        let event = &engine.safety_events()[0];
        assert_eq!(event.severity, crate::state::Severity::Critical);
        assert_eq!(event.details["separation_nm"], 0.9);
        assert_eq!(event.details["closing"], true);
        assert!(!event.resolved);
    }

    #[tokio::test]
    async fn test_alert_broadcast_and_history() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);
        let mut events = engine.events();

        engine.handle_event(text_frame(json!({
            "type": "alert:triggered",
            "data": {"id": "al-1", "hex": "abc123", "message": "emergency squawk"},
        })));

        assert_eq!(engine.alerts().len(), 1);
        assert_eq!(engine.alert_history().len(), 1);

        let mut triggered = false;
        while let Ok(notification) = events.try_recv() {
            if let EngineEvent::AlertTriggered(alert) = notification {
                assert_eq!(alert.hex.as_deref(), Some("ABC123"));
                triggered = true;
            }
        }
        assert!(triggered);
    }

    #[tokio::test]
    async fn test_airspace_full_replacement() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        engine.handle_event(text_frame(json!({
            "type": "airspace:update",
            "data": {"advisories": [{"id": "n1", "type": "notam", "text": "rwy closed"}]},
        })));
        assert_eq!(engine.airspace().advisories.len(), 1);

        engine.handle_event(text_frame(json!({
            "type": "airspace:update",
            "data": {"advisories": []},
        })));
        assert!(engine.airspace().advisories.is_empty());
    }

    #[tokio::test]
    async fn test_demo_snapshot_refused_while_connected() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);

        let mut batch = HashMap::new();
        batch.insert(
            "AD0001".to_string(),
            Aircraft {
                hex: "AD0001".to_string(),
                ..Default::default()
            },
        );
        assert!(!engine.apply_demo_snapshot(batch.clone()));
        assert!(!engine.demo_active());

        engine.handle_event(TransportEvent::Disconnected {
            reason: DisconnectReason::Closed,
        });
        assert!(engine.apply_demo_snapshot(batch));
        assert!(engine.demo_active());
        assert_eq!(engine.aircraft().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_frame_type_is_ignored() {
        let (engine, mut wire) = engine();
        connect(&engine, &mut wire);
        engine.handle_event(text_frame(json!({"type": "weather:metar", "data": {}})));
        assert!(engine.aircraft().is_empty());
    }
}
