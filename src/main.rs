//! Feed monitor - connects to a live aircraft feed and keeps dashboard
//! state in sync, with demo fallback when no feed is available.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use radar_sync::{Config, DemoFeed, FeedEngine, FrameSink, WsClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("radar_sync=info".parse().unwrap()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("===========================================");
    info!("   Radar Sync - Live Feed Monitor");
    info!("===========================================");

    // Load configuration from environment
    let config = Config::from_env();

    info!("Configuration:");
    info!("  Feed URL: {}", config.feed_url);
    info!("  Topics: {}", config.topics.join(", "));
    info!("  Request timeout: {:?}", config.request_timeout);
    info!("  Reconnect delay: {:?}", config.reconnect_delay);
    info!("  Demo grace: {:?}", config.demo_grace);

    // Wire the engine to the transport
    let (sink, outbound_rx) = FrameSink::channel();
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();

    let engine = FeedEngine::new(config.clone(), sink);
    let engine_task = tokio::spawn(Arc::clone(&engine).run(transport_rx));

    let client = WsClient::spawn(
        config.feed_url.clone(),
        config.reconnect_delay,
        transport_tx,
        outbound_rx,
    );
    let demo = DemoFeed::spawn(Arc::clone(&engine), config.demo_grace, config.demo_tick);

    info!("===========================================");
    info!("  Monitoring feed. Press Ctrl+C to stop.");
    info!("===========================================");

    // Periodic feed summary until interrupted
    let mut ticker = tokio::time::interval(config.stats_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                info!("[Feed] {}", engine.stats());
                engine.ping();
            }
        }
    }

    // Stop the demo fleet and the connection, then let the engine drain
    demo.shutdown().await;
    client.shutdown().await;
    engine.shutdown();
    let _ = engine_task.await;

    info!("Shutdown complete");
    Ok(())
}
