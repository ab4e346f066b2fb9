//! Synthetic fallback fleet
//!
//! When no live feed shows up within a grace period, a fixed six-aircraft
//! fleet around the San Francisco Bay starts ticking so the dashboard has
//! something to render. Each tick dead-reckons every aircraft forward and
//! installs a fresh snapshot flagged as demo data. The moment a live
//! connection appears the fleet parks itself; the engine refuses demo
//! writes while connected, so even a lost race cannot overwrite live data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::FeedEngine;
use crate::state::Aircraft;

/// One synthetic aircraft: current kinematic state plus a fixed turn rate
#[derive(Debug, Clone)]
struct DemoAircraft {
    hex: &'static str,
    flight: &'static str,
    aircraft_type: &'static str,
    military: bool,
    lat: f64,
    lon: f64,
    /// Feet
    alt: f64,
    /// Knots
    gs: f64,
    /// Degrees
    track: f64,
    /// Feet per minute
    vr: f64,
    /// Degrees per minute, signed
    turn_rate: f64,
}

fn seed_fleet() -> Vec<DemoAircraft> {
    vec![
        DemoAircraft {
            hex: "ADA001",
            flight: "UAL310",
            aircraft_type: "B738",
            military: false,
            lat: 37.72,
            lon: -122.48,
            alt: 34000.0,
            gs: 450.0,
            track: 135.0,
            vr: 0.0,
            turn_rate: 0.0,
        },
        DemoAircraft {
            hex: "ADA002",
            flight: "SWA1422",
            aircraft_type: "B737",
            military: false,
            lat: 37.55,
            lon: -122.20,
            alt: 11000.0,
            gs: 290.0,
            track: 310.0,
            vr: -1400.0,
            turn_rate: -1.5,
        },
        DemoAircraft {
            hex: "ADA003",
            flight: "DAL88",
            aircraft_type: "B763",
            military: false,
            lat: 37.85,
            lon: -122.55,
            alt: 8200.0,
            gs: 265.0,
            track: 70.0,
            vr: 2100.0,
            turn_rate: 1.0,
        },
        DemoAircraft {
            hex: "ADA004",
            flight: "N556CG",
            aircraft_type: "C172",
            military: false,
            lat: 37.46,
            lon: -122.11,
            alt: 3500.0,
            gs: 105.0,
            track: 200.0,
            vr: 0.0,
            turn_rate: 3.0,
        },
        DemoAircraft {
            hex: "ADA005",
            flight: "RCH479",
            aircraft_type: "C17",
            military: true,
            lat: 37.95,
            lon: -122.06,
            alt: 21000.0,
            gs: 380.0,
            track: 255.0,
            vr: 800.0,
            turn_rate: -0.5,
        },
        DemoAircraft {
            hex: "ADA006",
            flight: "SKW3321",
            aircraft_type: "E75L",
            military: false,
            lat: 37.38,
            lon: -122.40,
            alt: 17500.0,
            gs: 330.0,
            track: 25.0,
            vr: -600.0,
            turn_rate: 0.5,
        },
    ]
}

/// Dead-reckon the fleet forward by `dt_secs`
fn advance_fleet(fleet: &mut [DemoAircraft], dt_secs: f64) {
    for aircraft in fleet {
        let distance_nm = aircraft.gs * dt_secs / 3600.0;
        let track_rad = aircraft.track.to_radians();
        aircraft.lat += distance_nm / 60.0 * track_rad.cos();
        aircraft.lon += distance_nm / 60.0 * track_rad.sin() / aircraft.lat.to_radians().cos();
        aircraft.alt = (aircraft.alt + aircraft.vr * dt_secs / 60.0).clamp(500.0, 41000.0);
        aircraft.track = (aircraft.track + aircraft.turn_rate * dt_secs / 60.0).rem_euclid(360.0);
    }
}

fn to_batch(fleet: &[DemoAircraft]) -> HashMap<String, Aircraft> {
    fleet
        .iter()
        .map(|a| {
            (
                a.hex.to_string(),
                Aircraft {
                    hex: a.hex.to_string(),
                    flight: Some(a.flight.to_string()),
                    aircraft_type: Some(a.aircraft_type.to_string()),
                    lat: Some(a.lat),
                    lon: Some(a.lon),
                    alt_baro: Some(a.alt.round()),
                    gs: Some(a.gs),
                    track: Some(a.track),
                    vr: Some(a.vr),
                    military: Some(a.military),
                    on_ground: Some(false),
                    seen: Some(0.0),
                    ..Default::default()
                },
            )
        })
        .collect()
}

/// Handle to the background demo task
pub struct DemoFeed {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl DemoFeed {
    /// Start watching the engine's connection status; the task activates
    /// the fleet whenever the feed stays down past `grace`
    pub fn spawn(engine: Arc<FeedEngine>, grace: Duration, tick: Duration) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            run(engine, grace, tick, task_token).await;
        });
        Self { token, handle }
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn run(engine: Arc<FeedEngine>, grace: Duration, tick: Duration, token: CancellationToken) {
    let mut status = engine.watch_status();
    'watch: loop {
        if status.borrow_and_update().is_connected() {
            tokio::select! {
                _ = token.cancelled() => break 'watch,
                changed = status.changed() => {
                    if changed.is_err() {
                        break 'watch;
                    }
                    continue 'watch;
                }
            }
        }

        // disconnected: give the transport a grace period to come back
        tokio::select! {
            _ = token.cancelled() => break 'watch,
            changed = status.changed() => {
                if changed.is_err() {
                    break 'watch;
                }
                continue 'watch;
            }
            _ = tokio::time::sleep(grace) => {}
        }

        info!(grace_secs = grace.as_secs(), "no live feed, activating demo fleet");
        let mut fleet = seed_fleet();
        if !engine.apply_demo_snapshot(to_batch(&fleet)) {
            continue 'watch;
        }

        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break 'watch,
                changed = status.changed() => {
                    match changed {
                        Ok(()) if status.borrow_and_update().is_connected() => {
                            info!("live feed restored, demo fleet parked");
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => break 'watch,
                    }
                }
                _ = ticker.tick() => {
                    advance_fleet(&mut fleet, tick.as_secs_f64());
                    if !engine.apply_demo_snapshot(to_batch(&fleet)) {
                        debug!("demo snapshot refused, parking fleet");
                        break;
                    }
                }
            }
        }
    }
    debug!("demo task ending");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transport::{FrameSink, TransportEvent};
    use serde_json::json;

    #[test]
    fn test_seed_fleet_shape() {
        let fleet = seed_fleet();
        assert_eq!(fleet.len(), 6);
        let batch = to_batch(&fleet);
        assert_eq!(batch.len(), 6);
        for aircraft in batch.values() {
            assert!(aircraft.has_position());
            assert!(aircraft.hex.starts_with("ADA"));
        }
    }

    #[test]
    fn test_advance_moves_fleet() {
        let mut fleet = seed_fleet();
        let before: Vec<(f64, f64)> = fleet.iter().map(|a| (a.lat, a.lon)).collect();
        advance_fleet(&mut fleet, 60.0);
        for (aircraft, (lat, lon)) in fleet.iter().zip(before) {
            assert!(
                aircraft.lat != lat || aircraft.lon != lon,
                "{} did not move",
                aircraft.hex
            );
            assert!((0.0..360.0).contains(&aircraft.track));
            assert!(aircraft.alt >= 500.0);
        }
    }

    #[test]
    fn test_descent_clamps_at_floor() {
        let mut fleet = vec![DemoAircraft {
            hex: "ADA009",
            flight: "TEST1",
            aircraft_type: "B738",
            military: false,
            lat: 37.5,
            lon: -122.3,
            alt: 900.0,
            gs: 250.0,
            track: 90.0,
            vr: -3000.0,
            turn_rate: 0.0,
        }];
        advance_fleet(&mut fleet, 60.0);
        assert_eq!(fleet[0].alt, 500.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activates_after_grace_parks_on_connect() {
        let (sink, _wire) = FrameSink::channel();
        let engine = FeedEngine::new(Config::default(), sink);
        let demo = DemoFeed::spawn(
            Arc::clone(&engine),
            Duration::from_secs(3),
            Duration::from_secs(2),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(engine.demo_active());
        assert_eq!(engine.aircraft().len(), 6);

        engine.handle_event(TransportEvent::Connected);
        tokio::time::sleep(Duration::from_secs(10)).await;

        // first live snapshot sweeps the synthetic fleet out
        engine.handle_event(TransportEvent::Frame(
            json!({"type": "aircraft:snapshot", "data": [{"hex": "a1b2c3"}]}).to_string(),
        ));
        assert!(!engine.demo_active());
        assert_eq!(engine.aircraft().len(), 1);

        demo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_within_grace_blocks_activation() {
        let (sink, _wire) = FrameSink::channel();
        let engine = FeedEngine::new(Config::default(), sink);
        let demo = DemoFeed::spawn(
            Arc::clone(&engine),
            Duration::from_secs(5),
            Duration::from_secs(2),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        engine.handle_event(TransportEvent::Connected);
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!engine.demo_active());
        assert!(engine.aircraft().is_empty());

        demo.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_keeps_ticking_while_down() {
        let (sink, _wire) = FrameSink::channel();
        let engine = FeedEngine::new(Config::default(), sink);
        let demo = DemoFeed::spawn(
            Arc::clone(&engine),
            Duration::from_secs(3),
            Duration::from_secs(2),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        let first = engine.aircraft_by_hex("ADA001").unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        let later = engine.aircraft_by_hex("ADA001").unwrap();
        assert!(first.lat != later.lat || first.lon != later.lon);

        demo.shutdown().await;
    }
}
