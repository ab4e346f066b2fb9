//! Historical track replay: scrub position math, graph windowing, and
//! timed playback

mod player;
mod track;

pub use player::{ReplayFrame, ReplayPlayer, ReplayState};
pub use track::{GraphWindow, ReplayPoint, ReplayTrack};
