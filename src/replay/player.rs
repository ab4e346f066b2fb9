//! Timed replay playback
//!
//! Each open replay keys a `ReplayState`; pressing play spawns a frame
//! task that advances the position roughly 60 times a second and
//! broadcasts a frame per tick. Advancement is wall-clock based, so a
//! stalled runtime produces a jump rather than slow motion. Pausing or
//! closing cancels the task; the playing flag is re-checked every tick, so
//! a task that lost that race stops itself instead of dragging the
//! position further.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Playback frame cadence, roughly 60 per second
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Position percent advanced per millisecond at 1x speed; a full track
/// replays in twenty seconds
const PCT_PER_MS: f64 = 100.0 / 20_000.0;

/// Per-replay playback state
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayState {
    /// 0 = oldest sample, 100 = newest
    pub position_pct: f64,
    pub playing: bool,
    /// Playback rate multiplier
    pub speed: f64,
}

impl Default for ReplayState {
    fn default() -> Self {
        Self {
            position_pct: 0.0,
            playing: false,
            speed: 1.0,
        }
    }
}

/// One playback progress notification
#[derive(Debug, Clone)]
pub struct ReplayFrame {
    /// Replay key, usually the aircraft hex
    pub key: String,
    pub position_pct: f64,
    /// True on the frame that reached the end of the track
    pub finished: bool,
}

struct PlayerTask {
    /// Distinguishes this task from a replacement under the same key
    id: u64,
    token: CancellationToken,
}

/// Playback controller for any number of concurrent replays
pub struct ReplayPlayer {
    states: Arc<Mutex<HashMap<String, ReplayState>>>,
    tasks: Arc<Mutex<HashMap<String, PlayerTask>>>,
    frames_tx: broadcast::Sender<ReplayFrame>,
    next_task_id: AtomicU64,
}

impl ReplayPlayer {
    pub fn new() -> Self {
        let (frames_tx, _) = broadcast::channel(2048);
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            frames_tx,
            next_task_id: AtomicU64::new(0),
        }
    }

    /// Subscribe to playback frames for all replays
    pub fn frames(&self) -> broadcast::Receiver<ReplayFrame> {
        self.frames_tx.subscribe()
    }

    /// Current state for a key; a never-touched key reads as the default
    pub fn state(&self, key: &str) -> ReplayState {
        self.states
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn active_players(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Start playback, or pause it if already playing. Playing from the end
    /// restarts at the beginning.
    pub fn toggle_play(&self, key: &str) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_default();

        if state.playing {
            state.playing = false;
            drop(states);
            self.cancel_task(key);
            return;
        }

        if state.position_pct >= 100.0 {
            state.position_pct = 0.0;
        }
        state.playing = true;
        drop(states);
        self.spawn_task(key);
    }

    /// Scrub to a position; live playback continues from there
    pub fn set_position(&self, key: &str, position_pct: f64) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_default();
        state.position_pct = position_pct.clamp(0.0, 100.0);
    }

    pub fn set_speed(&self, key: &str, speed: f64) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_default();
        state.speed = speed.clamp(0.25, 16.0);
    }

    /// Tear down a replay entirely; its next open starts from the default
    /// state
    pub fn close(&self, key: &str) {
        self.cancel_task(key);
        self.states.lock().unwrap().remove(key);
    }

    fn cancel_task(&self, key: &str) {
        if let Some(task) = self.tasks.lock().unwrap().remove(key) {
            task.token.cancel();
        }
    }

    fn spawn_task(&self, key: &str) {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.tasks.lock().unwrap().insert(
            key.to_string(),
            PlayerTask {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let key = key.to_string();
        let states = Arc::clone(&self.states);
        let tasks = Arc::clone(&self.tasks);
        let frames_tx = self.frames_tx.clone();
        tokio::spawn(async move {
            run_player(key, id, states, tasks, frames_tx, token).await;
        });
    }
}

impl Default for ReplayPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReplayPlayer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().unwrap().drain() {
            task.token.cancel();
        }
    }
}

async fn run_player(
    key: String,
    task_id: u64,
    states: Arc<Mutex<HashMap<String, ReplayState>>>,
    tasks: Arc<Mutex<HashMap<String, PlayerTask>>>,
    frames_tx: broadcast::Sender<ReplayFrame>,
    token: CancellationToken,
) {
    let mut ticker = interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            tick = ticker.tick() => {
                let elapsed_ms = (tick - last).as_secs_f64() * 1000.0;
                last = tick;

                let frame = {
                    let mut states = states.lock().unwrap();
                    let Some(state) = states.get_mut(&key) else {
                        return;
                    };
                    if !state.playing {
                        return;
                    }
                    state.position_pct =
                        (state.position_pct + elapsed_ms * PCT_PER_MS * state.speed).min(100.0);
                    let finished = state.position_pct >= 100.0;
                    if finished {
                        state.playing = false;
                    }
                    ReplayFrame {
                        key: key.clone(),
                        position_pct: state.position_pct,
                        finished,
                    }
                };

                let finished = frame.finished;
                let _ = frames_tx.send(frame);
                if finished {
                    debug!(key = %key, "replay reached end of track");
                    // a restart may already own this key
                    let mut tasks = tasks.lock().unwrap();
                    if tasks.get(&key).map(|t| t.id) == Some(task_id) {
                        tasks.remove(&key);
                    }
                    return;
                }
            }
        }
    }
}
