//! Real-time synchronization and replay engine for live aircraft-tracking
//! dashboards
//!
//! Connects to an aircraft data feed over WebSocket, normalizes the mixed
//! field conventions upstream producers use, and keeps canonical dashboard
//! state in sync across disconnects. When no feed is available a synthetic
//! demo fleet keeps the display alive, and fetched position history can be
//! replayed with scrubbing, zooming, and timed playback.

pub mod config;
pub mod demo;
pub mod engine;
pub mod errors;
pub mod normalize;
pub mod protocol;
pub mod replay;
pub mod requests;
pub mod state;
pub mod subscriptions;
pub mod transport;
pub mod ws_client;

pub use config::Config;
pub use demo::DemoFeed;
pub use engine::{EngineEvent, FeedEngine};
pub use errors::FeedError;
pub use replay::{
    GraphWindow, ReplayFrame, ReplayPlayer, ReplayPoint, ReplayState, ReplayTrack,
};
pub use state::{Aircraft, FeedStats, SafetyEvent, TrackSample};
pub use transport::{ConnectionStatus, FrameSink, TransportEvent};
pub use ws_client::WsClient;
