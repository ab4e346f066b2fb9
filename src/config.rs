//! Configuration loaded from environment variables

use std::time::Duration;

/// Engine and monitor configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Feed WebSocket URL
    pub feed_url: String,

    /// Topics to subscribe to on every connect
    pub topics: Vec<String>,

    /// Default timeout for tracked requests
    pub request_timeout: Duration,

    /// Delay between reconnect attempts
    pub reconnect_delay: Duration,

    /// How long to wait for a connection before demo mode activates
    pub demo_grace: Duration,

    /// Interval between demo fleet advances
    pub demo_tick: Duration,

    /// Stats summary log interval for the monitor binary
    pub stats_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            feed_url: std::env::var("FEED_URL")
                .unwrap_or_else(|_| "ws://localhost:8888/ws".to_string()),

            topics: std::env::var("FEED_TOPICS")
                .unwrap_or_else(|_| "aircraft,safety,alerts,acars,audio,airspace".to_string())
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),

            request_timeout: Duration::from_millis(
                std::env::var("REQUEST_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10_000),
            ),

            reconnect_delay: Duration::from_millis(
                std::env::var("RECONNECT_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2_000),
            ),

            demo_grace: Duration::from_millis(
                std::env::var("DEMO_GRACE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3_000),
            ),

            demo_tick: Duration::from_millis(
                std::env::var("DEMO_TICK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2_000),
            ),

            stats_interval: Duration::from_secs(
                std::env::var("STATS_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: "ws://localhost:8888/ws".to_string(),
            topics: vec![
                "aircraft".to_string(),
                "safety".to_string(),
                "alerts".to_string(),
                "acars".to_string(),
                "audio".to_string(),
                "airspace".to_string(),
            ],
            request_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(2),
            demo_grace: Duration::from_secs(3),
            demo_tick: Duration::from_secs(2),
            stats_interval: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics() {
        let config = Config::default();
        assert!(config.topics.iter().any(|t| t == "aircraft"));
        assert!(config.topics.iter().any(|t| t == "safety"));
        assert_eq!(config.demo_grace, Duration::from_secs(3));
        assert_eq!(config.demo_tick, Duration::from_secs(2));
    }
}
